//! Shared blocking HTTP agent.

use ureq::{Agent, AgentBuilder};

use mirror_core::MirrorConfig;

/// Build the agent every request of an invocation goes through.
///
/// The per-request timeout bounds a hung fetch so it cannot stall a pass.
pub fn agent(config: &MirrorConfig) -> Agent {
    AgentBuilder::new()
        .timeout(config.request_timeout())
        .user_agent(&config.user_agent)
        .build()
}

/// Short human-readable description of a failed request.
pub(crate) fn describe(err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, response) => {
            format!("HTTP {code} {}", response.status_text())
        }
        ureq::Error::Transport(transport) => transport.to_string(),
    }
}
