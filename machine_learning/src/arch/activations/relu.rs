#[derive(Clone, Copy, Debug, Default)]
pub struct Relu;

impl Relu {
    pub fn f(&self, z: f32) -> f32 {
        z.max(0.)
    }

    pub fn df(&self, z: f32) -> f32 {
        if z > 0. { 1. } else { 0. }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_negatives() {
        assert_eq!(Relu.f(-2.), 0.);
        assert_eq!(Relu.f(3.), 3.);
        assert_eq!(Relu.df(-2.), 0.);
        assert_eq!(Relu.df(3.), 1.);
    }
}
