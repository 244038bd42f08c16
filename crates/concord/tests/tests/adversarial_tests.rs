#[path = "adversarial/forge_evidence.rs"]
mod forge_evidence;

#[path = "adversarial/tampered_storage.rs"]
mod tampered_storage;

#[path = "adversarial/concurrent_writers.rs"]
mod concurrent_writers;

#[path = "adversarial/degraded_audit.rs"]
mod degraded_audit;
