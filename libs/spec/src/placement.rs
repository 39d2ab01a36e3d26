//! Placement rules.
//!
//! A placement rule restricts which agents a pod's tasks may land on. Rules
//! are part of the specification, so they serialize with it; evaluation only
//! needs the candidate agent's identity and attributes, keeping this crate
//! independent of the offer model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A constraint over candidate agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PlacementRule {
    /// No constraint.
    Any,

    /// Only the listed agents are acceptable.
    RequireAgents { agents: Vec<String> },

    /// The listed agents are unacceptable.
    AvoidAgents { agents: Vec<String> },

    /// The agent must carry an attribute with this exact value.
    RequireAttribute { name: String, value: String },

    /// All sub-rules must pass.
    And { rules: Vec<PlacementRule> },

    /// At least one sub-rule must pass.
    Or { rules: Vec<PlacementRule> },
}

impl PlacementRule {
    /// Whether an agent with the given identity and attributes is acceptable.
    pub fn allows(&self, agent_id: &str, attributes: &BTreeMap<String, String>) -> bool {
        match self {
            PlacementRule::Any => true,
            PlacementRule::RequireAgents { agents } => agents.iter().any(|a| a == agent_id),
            PlacementRule::AvoidAgents { agents } => !agents.iter().any(|a| a == agent_id),
            PlacementRule::RequireAttribute { name, value } => {
                attributes.get(name).is_some_and(|v| v == value)
            }
            PlacementRule::And { rules } => rules.iter().all(|r| r.allows(agent_id, attributes)),
            PlacementRule::Or { rules } => rules.iter().any(|r| r.allows(agent_id, attributes)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_any_allows_everything() {
        assert!(PlacementRule::Any.allows("agent-1", &BTreeMap::new()));
    }

    #[test]
    fn test_require_agents() {
        let rule = PlacementRule::RequireAgents {
            agents: vec!["agent-1".to_string(), "agent-2".to_string()],
        };
        assert!(rule.allows("agent-1", &BTreeMap::new()));
        assert!(!rule.allows("agent-3", &BTreeMap::new()));
    }

    #[test]
    fn test_avoid_agents() {
        let rule = PlacementRule::AvoidAgents {
            agents: vec!["agent-1".to_string()],
        };
        assert!(!rule.allows("agent-1", &BTreeMap::new()));
        assert!(rule.allows("agent-2", &BTreeMap::new()));
    }

    #[test]
    fn test_require_attribute() {
        let rule = PlacementRule::RequireAttribute {
            name: "zone".to_string(),
            value: "us-east-1a".to_string(),
        };
        assert!(rule.allows("a", &attrs(&[("zone", "us-east-1a")])));
        assert!(!rule.allows("a", &attrs(&[("zone", "us-east-1b")])));
        assert!(!rule.allows("a", &BTreeMap::new()));
    }

    #[test]
    fn test_and_or_composition() {
        let rule = PlacementRule::And {
            rules: vec![
                PlacementRule::AvoidAgents {
                    agents: vec!["agent-bad".to_string()],
                },
                PlacementRule::Or {
                    rules: vec![
                        PlacementRule::RequireAttribute {
                            name: "ssd".to_string(),
                            value: "true".to_string(),
                        },
                        PlacementRule::RequireAgents {
                            agents: vec!["agent-grandfathered".to_string()],
                        },
                    ],
                },
            ],
        };
        assert!(rule.allows("agent-1", &attrs(&[("ssd", "true")])));
        assert!(rule.allows("agent-grandfathered", &BTreeMap::new()));
        assert!(!rule.allows("agent-bad", &attrs(&[("ssd", "true")])));
        assert!(!rule.allows("agent-1", &attrs(&[("ssd", "false")])));
    }

    #[test]
    fn test_rule_json_roundtrip() {
        let rule = PlacementRule::And {
            rules: vec![
                PlacementRule::Any,
                PlacementRule::RequireAttribute {
                    name: "rack".to_string(),
                    value: "r7".to_string(),
                },
            ],
        };
        let json = serde_json::to_string(&rule).unwrap();
        let parsed: PlacementRule = serde_json::from_str(&json).unwrap();
        assert_eq!(rule, parsed);
    }
}
