/// Squashes its input into (-1, 1), matching images normalised to that range.
#[derive(Clone, Copy, Debug, Default)]
pub struct Tanh;

impl Tanh {
    pub fn f(&self, z: f32) -> f32 {
        z.tanh()
    }

    pub fn df(&self, z: f32) -> f32 {
        1. - z.tanh().powi(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivative_matches_finite_difference() {
        let h = 1e-3;
        for z in [-2., -0.5, 0., 0.7, 1.5] {
            let numeric = (Tanh.f(z + h) - Tanh.f(z - h)) / (2. * h);
            assert!((numeric - Tanh.df(z)).abs() < 1e-2);
        }
    }
}
