use super::{jobs, DispatchJob};
use crate::config::PodiumSettings;
use crate::models::TrafficRule;
use crate::registry::EndpointRegistry;
use std::collections::BTreeMap;
use tracing::error;

/// How rule registration is ordered across hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationMode {
    /// Every server host completes before any client host is contacted
    Phased,
    /// Server and client rules go out together, one call per host
    Merged,
}

impl RegistrationMode {
    pub fn from_settings(settings: &PodiumSettings) -> Self {
        if settings.traffic_start_servers_first {
            RegistrationMode::Phased
        } else {
            RegistrationMode::Merged
        }
    }
}

/// Rules split by role and owning host
///
/// A rule lands under its destination's host as a server and under its
/// source's host as a client.
#[derive(Debug, Default, Clone)]
pub struct RegistrationPlan {
    pub servers: BTreeMap<String, Vec<TrafficRule>>,
    pub clients: BTreeMap<String, Vec<TrafficRule>>,
    /// Rules with both ends resolved, in input order
    pub rules: Vec<TrafficRule>,
    /// Rules dropped because an end has no owning host
    pub skipped: Vec<TrafficRule>,
}

impl RegistrationPlan {
    pub fn build(rules: Vec<TrafficRule>, registry: &EndpointRegistry) -> Self {
        let mut plan = Self::default();
        for rule in rules {
            let resolved = registry
                .require(&rule.src)
                .and_then(|src| registry.require(&rule.dst).map(|dst| (src, dst)));
            match resolved {
                Ok((src_host, dst_host)) => {
                    plan.servers.entry(dst_host).or_default().push(rule.clone());
                    plan.clients.entry(src_host).or_default().push(rule.clone());
                    plan.rules.push(rule);
                }
                Err(e) => {
                    error!(ruleid = %rule.ruleid, error = %e, "Skipping rule");
                    plan.skipped.push(rule);
                }
            }
        }
        plan
    }

    /// Dispatch waves: each wave must finish before the next one starts
    pub fn phases(&self, mode: RegistrationMode) -> Vec<Vec<DispatchJob<Vec<TrafficRule>>>> {
        match mode {
            RegistrationMode::Phased => vec![
                jobs("register_servers", self.servers.clone()),
                jobs("register_clients", self.clients.clone()),
            ],
            RegistrationMode::Merged => {
                let mut merged = self.servers.clone();
                for (host, rules) in &self.clients {
                    merged.entry(host.clone()).or_default().extend(rules.iter().cloned());
                }
                vec![jobs("register", merged)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Protocol, TrafficIntent};

    fn registry() -> EndpointRegistry {
        let registry = EndpointRegistry::new();
        registry.insert("10.0.0.1", "h1");
        registry.insert("10.0.0.2", "h2");
        registry.insert("10.0.0.3", "h2");
        registry
    }

    fn rule(src: &str, dst: &str) -> TrafficRule {
        TrafficRule::from_intent(TrafficIntent::new(src, dst, 80, Protocol::Tcp)).unwrap()
    }

    #[test]
    fn test_plan_splits_by_role() {
        let plan = RegistrationPlan::build(
            vec![rule("10.0.0.1", "10.0.0.2"), rule("10.0.0.3", "10.0.0.1")],
            &registry(),
        );

        assert_eq!(plan.rules.len(), 2);
        assert_eq!(plan.servers["h2"].len(), 1);
        assert_eq!(plan.servers["h1"].len(), 1);
        assert_eq!(plan.clients["h1"].len(), 1);
        assert_eq!(plan.clients["h2"].len(), 1);
    }

    #[test]
    fn test_unresolved_rules_are_skipped() {
        let plan = RegistrationPlan::build(
            vec![rule("10.0.0.1", "10.9.9.9"), rule("10.0.0.1", "10.0.0.2")],
            &registry(),
        );

        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].dst, "10.9.9.9");
        assert_eq!(plan.rules.len(), 1);
    }

    #[test]
    fn test_phases_by_mode() {
        let plan = RegistrationPlan::build(vec![rule("10.0.0.1", "10.0.0.2")], &registry());

        let phased = plan.phases(RegistrationMode::Phased);
        assert_eq!(phased.len(), 2);
        assert_eq!(phased[0][0].host, "h2");
        assert_eq!(phased[1][0].host, "h1");

        let merged = plan.phases(RegistrationMode::Merged);
        assert_eq!(merged.len(), 1);
        let hosts: Vec<&str> = merged[0].iter().map(|j| j.host.as_str()).collect();
        assert_eq!(hosts, vec!["h1", "h2"]);
    }

    #[test]
    fn test_mode_follows_settings() {
        let mut settings = PodiumSettings::default();
        assert_eq!(RegistrationMode::from_settings(&settings), RegistrationMode::Phased);
        settings.traffic_start_servers_first = false;
        assert_eq!(RegistrationMode::from_settings(&settings), RegistrationMode::Merged);
    }
}
