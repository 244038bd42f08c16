#[path = "e2e/reference_scenarios.rs"]
mod reference_scenarios;

#[path = "e2e/lifecycle.rs"]
mod lifecycle;

#[path = "e2e/background_sweep.rs"]
mod background_sweep;
