//! BDD scenarios for the provisioning pipeline.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ProvisionContext, provision_context};

#[scenario(
    path = "tests/features/provision.feature",
    name = "Provision a fresh knowledge base stack"
)]
fn scenario_fresh_stack(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Finish a vector store left without its index"
)]
fn scenario_resume_vector_store(provision_context: ProvisionContext) {
    let _ = provision_context;
}

#[scenario(
    path = "tests/features/provision.feature",
    name = "Stop when the knowledge base fails"
)]
fn scenario_knowledge_base_fails(provision_context: ProvisionContext) {
    let _ = provision_context;
}
