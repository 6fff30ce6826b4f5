use super::{Provider, ProviderDescriptor, UpdateContext, UpdateOutcome, UpdateRequest};
use crate::config::Config;
use crate::validate::{Field, Prompt, ValidationError};

/// Does nothing and always succeeds. Handy for testing the daemon loop and
/// the post-update command.
pub static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    id: "null",
    aliases: &[],
    name: "no service (testing)",
    server: "",
    port: 0,
    request: "",
    supported: &[Field::Host, Field::Address],
    required: &[],
    default_max_interval: None,
};

pub struct Null;

impl Provider for Null {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        &DESCRIPTOR
    }

    fn check_info(&self, _config: &mut Config, _prompt: &dyn Prompt) -> Result<(), ValidationError> {
        Ok(())
    }

    fn update_entry(&self, _ctx: &UpdateContext, request: &UpdateRequest) -> UpdateOutcome {
        log::debug!("null service: pretending to publish '{}'", request.address_string());
        UpdateOutcome::Success
    }
}
