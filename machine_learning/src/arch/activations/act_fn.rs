use super::{Relu, Tanh};

#[derive(Debug, Clone, Copy)]
pub enum ActFn {
    Relu(Relu),
    Tanh(Tanh),
}

impl ActFn {
    pub fn relu() -> Self {
        ActFn::Relu(Relu)
    }

    pub fn tanh() -> Self {
        ActFn::Tanh(Tanh)
    }

    pub fn f(&self, z: f32) -> f32 {
        match self {
            ActFn::Relu(a) => a.f(z),
            ActFn::Tanh(a) => a.f(z),
        }
    }

    pub fn df(&self, z: f32) -> f32 {
        match self {
            ActFn::Relu(a) => a.df(z),
            ActFn::Tanh(a) => a.df(z),
        }
    }
}
