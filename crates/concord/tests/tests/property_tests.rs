#[path = "property/voting.rs"]
mod voting;

#[path = "property/sanctions.rs"]
mod sanctions;

#[path = "property/emergency.rs"]
mod emergency;

#[path = "property/audit_chain.rs"]
mod audit_chain;
