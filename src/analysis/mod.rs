pub mod loop_analysis;
pub mod scalar_evolution;
