//! Typed view of the base polling document returned by `GET {base}`.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
struct Href {
    href: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Links {
    #[serde(rename = "configData")]
    config_data: Option<Href>,
    #[serde(rename = "cancelAction")]
    cancel_action: Option<Href>,
    #[serde(rename = "deploymentBase")]
    deployment_base: Option<Href>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PollingHint {
    sleep: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PollingConfig {
    polling: Option<PollingHint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawPollResponse {
    #[serde(default)]
    config: Option<PollingConfig>,
    #[serde(default, rename = "_links")]
    links: Links,
}

/// Which of the three hypermedia action links the server offered this
/// cycle, in dispatch priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionLink<'a> {
    CancelAction(&'a str),
    DeploymentBase(&'a str),
    ConfigData(&'a str),
}

/// Parsed base polling response.
#[derive(Debug, Clone)]
pub struct PollResponse {
    config_data_link: Option<String>,
    cancel_action_link: Option<String>,
    deployment_base_link: Option<String>,
    sleep: Option<Duration>,
}

impl PollResponse {
    /// Parses the raw JSON body of a `GET {base}` response.
    ///
    /// # Errors
    /// Returns the underlying `serde_json` error if the payload does not
    /// match the expected schema.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawPollResponse = serde_json::from_slice(body)?;
        let sleep = raw
            .config
            .and_then(|c| c.polling)
            .and_then(|p| p.sleep)
            .as_deref()
            .and_then(parse_hhmmss);
        Ok(Self {
            config_data_link: raw.links.config_data.map(|h| h.href),
            cancel_action_link: raw.links.cancel_action.map(|h| h.href),
            deployment_base_link: raw.links.deployment_base.map(|h| h.href),
            sleep,
        })
    }

    /// The server-provided polling sleep hint, if present and parseable.
    /// Any parse failure is treated as no hint this cycle, which the
    /// controller resolves by retaining the prior value.
    #[must_use]
    pub fn sleep_hint(&self) -> Option<Duration> {
        self.sleep
    }

    /// The single action link to act on this cycle, per dispatch priority:
    /// `cancelAction` > `deploymentBase` > `configData`.
    #[must_use]
    pub fn dispatch_link(&self) -> Option<ActionLink<'_>> {
        if let Some(href) = &self.cancel_action_link {
            Some(ActionLink::CancelAction(href))
        } else if let Some(href) = &self.deployment_base_link {
            Some(ActionLink::DeploymentBase(href))
        } else if let Some(href) = &self.config_data_link {
            Some(ActionLink::ConfigData(href))
        } else {
            None
        }
    }
}

/// Parses an `HH:MM:SS` duration as used by hawkBit's polling hint.
fn parse_hhmmss(s: &str) -> Option<Duration> {
    let mut parts = s.splitn(3, ':');
    let h: u64 = parts.next()?.parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let sec: u64 = parts.next()?.parse().ok()?;
    Some(Duration::from_secs(h * 3600 + m * 60 + sec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_links_and_sleep_hint() {
        let body = br#"{
            "config": {"polling": {"sleep": "00:00:05"}},
            "_links": {
                "configData": {"href": "https://example/configData"},
                "cancelAction": {"href": "https://example/cancelAction"},
                "deploymentBase": {"href": "https://example/deploymentBase"}
            }
        }"#;
        let r = PollResponse::parse(body).unwrap();
        assert_eq!(r.sleep_hint(), Some(Duration::from_secs(5)));
        assert_eq!(
            r.dispatch_link(),
            Some(ActionLink::CancelAction("https://example/cancelAction"))
        );
    }

    #[test]
    fn no_links_means_no_actions() {
        let body = br#"{"config": {"polling": {"sleep": "00:01:00"}}, "_links": {}}"#;
        let r = PollResponse::parse(body).unwrap();
        assert!(r.dispatch_link().is_none());
        assert_eq!(r.sleep_hint(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn deployment_takes_priority_over_config() {
        let body = br#"{
            "_links": {
                "configData": {"href": "c"},
                "deploymentBase": {"href": "d"}
            }
        }"#;
        let r = PollResponse::parse(body).unwrap();
        assert_eq!(r.dispatch_link(), Some(ActionLink::DeploymentBase("d")));
    }

    #[test]
    fn malformed_sleep_hint_is_treated_as_absent() {
        let body = br#"{"config": {"polling": {"sleep": "not-a-time"}}, "_links": {}}"#;
        let r = PollResponse::parse(body).unwrap();
        assert_eq!(r.sleep_hint(), None);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let body = b"not json";
        assert!(PollResponse::parse(body).is_err());
    }
}
