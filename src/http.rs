use reqwest::Client;
use std::time::Duration;

/// Sent on every outbound call (OpenAI, S3, GitHub); the GitHub API
/// rejects requests without one.
pub const USER_AGENT: &str = concat!("postcard-lister/", env!("CARGO_PKG_VERSION"));

fn env_secs(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

pub fn build_client() -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(env_secs("HTTP_TIMEOUT_SECS", 15)))
        .connect_timeout(Duration::from_secs(env_secs("HTTP_CONNECT_TIMEOUT_SECS", 5)))
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_names_this_crate() {
        assert!(USER_AGENT.starts_with("postcard-lister/"));
        assert!(USER_AGENT.len() > "postcard-lister/".len());
    }
}
