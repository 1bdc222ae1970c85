//! Identity of the user, machine and session a job was printed from.
//!
//! These lookups never fail: missing values fall back to placeholders so a
//! job is never rejected because its environment is incomplete.

/// User, machine and session lookups recorded on every source file.
pub trait HostIdentity: Send + Sync {
    fn user_name(&self) -> String;
    fn machine_name(&self) -> String;
    fn session_id(&self) -> u32;
    /// Terminal-services station name (`SESSIONNAME`), if any.
    fn session_label(&self) -> Option<String>;
}

/// Reads identity from the current process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdentity;

impl HostIdentity for SystemIdentity {
    fn user_name(&self) -> String {
        first_env(&["USER", "USERNAME", "LOGNAME"]).unwrap_or_else(|| "unknown".to_string())
    }

    fn machine_name(&self) -> String {
        first_env(&["COMPUTERNAME", "HOSTNAME"])
            .or_else(|| {
                std::fs::read_to_string("/etc/hostname")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
            })
            .map(|name| name.replace('\\', ""))
            .unwrap_or_else(|| "localhost".to_string())
    }

    fn session_id(&self) -> u32 {
        first_env(&["XDG_SESSION_ID"])
            .and_then(|id| id.parse().ok())
            .unwrap_or(0)
    }

    fn session_label(&self) -> Option<String> {
        first_env(&["SESSIONNAME"])
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|v| !v.trim().is_empty())
}

/// Fixed identity, for hosts that resolve identity themselves and for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity {
    pub user_name: String,
    pub machine_name: String,
    pub session_id: u32,
    pub session_label: Option<String>,
}

impl HostIdentity for StaticIdentity {
    fn user_name(&self) -> String {
        self.user_name.clone()
    }

    fn machine_name(&self) -> String {
        self.machine_name.clone()
    }

    fn session_id(&self) -> u32 {
        self.session_id
    }

    fn session_label(&self) -> Option<String> {
        self.session_label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_identity_never_returns_empty_names() {
        let id = SystemIdentity;
        assert!(!id.user_name().is_empty());
        assert!(!id.machine_name().is_empty());
        assert!(!id.machine_name().contains('\\'));
    }

    #[test]
    fn static_identity_round_trips_fields() {
        let id = StaticIdentity {
            user_name: "alice".into(),
            machine_name: "WS01".into(),
            session_id: 2,
            session_label: Some("RDP-Tcp#3".into()),
        };
        assert_eq!(id.user_name(), "alice");
        assert_eq!(id.session_id(), 2);
        assert_eq!(id.session_label().as_deref(), Some("RDP-Tcp#3"));
    }
}
