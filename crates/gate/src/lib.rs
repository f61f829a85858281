pub mod engine;
pub mod types;

pub use engine::LiquidityGate;
pub use types::GateVerdict;
