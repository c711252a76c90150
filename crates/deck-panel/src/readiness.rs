//! Readiness detection for the gateway's startup output.

/// What the output seen so far says about startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No decision yet; keep reading.
    Unknown,
    Ready,
    Failed(String),
}

/// Decides from accumulated output whether the gateway has come up.
///
/// `assess` receives everything captured since launch, not just the latest
/// chunk, so markers split across reads are still found.
pub trait ReadinessPolicy: Send + Sync {
    fn assess(&self, output: &str) -> Verdict;
}

impl<F> ReadinessPolicy for F
where
    F: Fn(&str) -> Verdict + Send + Sync,
{
    fn assess(&self, output: &str) -> Verdict {
        self(output)
    }
}

/// Case-sensitive substring matching. Failure markers win over ready markers.
#[derive(Debug, Clone)]
pub struct MarkerPolicy {
    ready: Vec<String>,
    failure: Vec<String>,
}

impl MarkerPolicy {
    pub fn new<I, S>(ready: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ready: ready.into_iter().map(Into::into).collect(),
            failure: Vec::new(),
        }
    }

    pub fn with_failure_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failure = markers.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for MarkerPolicy {
    fn default() -> Self {
        Self::new(["listening", "ready", "Gateway"])
    }
}

impl ReadinessPolicy for MarkerPolicy {
    fn assess(&self, output: &str) -> Verdict {
        if let Some(marker) = self.failure.iter().find(|m| output.contains(m.as_str())) {
            return Verdict::Failed(format!("output contained {marker:?}"));
        }
        if self.ready.iter().any(|m| output.contains(m.as_str())) {
            Verdict::Ready
        } else {
            Verdict::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_markers() {
        let policy = MarkerPolicy::default();
        assert_eq!(policy.assess("booting..."), Verdict::Unknown);
        assert_eq!(policy.assess("listening on 127.0.0.1:18789"), Verdict::Ready);
        assert_eq!(policy.assess("[Gateway] up"), Verdict::Ready);
    }

    #[test]
    fn markers_are_case_sensitive() {
        let policy = MarkerPolicy::default();
        assert_eq!(policy.assess("LISTENING"), Verdict::Unknown);
        assert_eq!(policy.assess("gateway"), Verdict::Unknown);
    }

    #[test]
    fn failure_wins() {
        let policy = MarkerPolicy::default().with_failure_markers(["EADDRINUSE"]);
        let verdict = policy.assess("Gateway: listen EADDRINUSE 18789");
        assert!(matches!(verdict, Verdict::Failed(reason) if reason.contains("EADDRINUSE")));
    }

    #[test]
    fn closures_are_policies() {
        let policy = |out: &str| {
            if out.ends_with('!') {
                Verdict::Ready
            } else {
                Verdict::Unknown
            }
        };
        assert_eq!(policy.assess("up!"), Verdict::Ready);
    }
}
