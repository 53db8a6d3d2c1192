use core::fmt;

/// Upper bound on the host component, so names stay short in logs and on
/// the wire.
const MAX_HOST_LEN: usize = 64;

/// The name a process registers under with the orchestrator:
/// `{host}-{pid}-{nonce}`.
///
/// The random nonce keeps instances that start at the same moment on the same
/// host (or reuse a pid after a restart) from presenting the same name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct InstanceName(String);

impl InstanceName {
    /// Builds a name from explicit parts. The host is sanitized to
    /// `[A-Za-z0-9._-]` and truncated.
    pub fn new(host: &str, pid: u32, nonce: u32) -> Self {
        let mut host: String = host
            .trim()
            .chars()
            .take(MAX_HOST_LEN)
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        if host.is_empty() {
            host.push_str("unknown");
        }
        Self(format!("{host}-{pid}-{nonce:08x}"))
    }

    /// Builds a name for the current process with a fresh random nonce.
    pub fn for_current_process(host: &str) -> Self {
        Self::new(host, std::process::id(), rand::random())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InstanceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_host_pid_nonce() {
        let name = InstanceName::new("node-a.internal", 4242, 0xbeef);
        assert_eq!(name.as_str(), "node-a.internal-4242-0000beef");
    }

    #[test]
    fn sanitizes_host() {
        assert_eq!(InstanceName::new(" my host/1 ", 1, 0).as_str(), "my-host-1-1-00000000");
        assert_eq!(InstanceName::new("", 7, 1).as_str(), "unknown-7-00000001");
    }

    #[test]
    fn current_process_names_differ() {
        let a = InstanceName::for_current_process("host");
        let b = InstanceName::for_current_process("host");
        let prefix = format!("host-{}-", std::process::id());
        assert!(a.as_str().starts_with(&prefix));
        // 2^-32 chance of a false failure.
        assert_ne!(a, b);
    }
}
