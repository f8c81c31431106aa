pub mod scalar_impls;
pub mod std_ops;
