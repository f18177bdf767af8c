//! Clinical observations produced by the observation service.

use serde::{Deserialize, Serialize};

/// Domain whose observations describe reporting quality rather than
/// clinical evidence.
pub const NARRATIVE_UNCERTAINTY_DOMAIN: &str = "narrative_uncertainty";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationConfidence {
    High,
    #[default]
    Moderate,
    Low,
}

/// One finding with the verbatim quote that supports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub finding: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub confidence: ObservationConfidence,
}

impl Observation {
    pub fn new(finding: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            finding: finding.into(),
            context: context.into(),
            confidence: ObservationConfidence::default(),
        }
    }

    /// Finding label and quote joined and lower-cased for keyword tests.
    pub fn match_text(&self) -> String {
        format!("{} {}", self.finding, self.context).to_lowercase()
    }
}

/// Observations recorded under one clinical domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainObservations {
    pub domain: String,
    pub observations: Vec<Observation>,
}

/// Observations grouped by clinical domain plus explicitly negated findings.
///
/// Domains keep the order the observation service supplied them in, which
/// is the scan order the matcher uses for first-match-wins. On the wire the
/// domains are still a JSON object; a repeated key appends to the first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationSet {
    #[serde(default, with = "ordered_domains")]
    pub clinical_observations: Vec<DomainObservations>,
    #[serde(default)]
    pub key_negatives: Vec<String>,
}

impl ObservationSet {
    pub fn add(&mut self, domain: &str, observation: Observation) -> &mut Self {
        match self.clinical_observations.iter_mut().find(|d| d.domain == domain) {
            Some(entry) => entry.observations.push(observation),
            None => self.clinical_observations.push(DomainObservations {
                domain: domain.to_string(),
                observations: vec![observation],
            }),
        }
        self
    }

    /// All observations in scan order: domain as supplied, then list position.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Observation)> {
        self.clinical_observations
            .iter()
            .flat_map(|d| d.observations.iter().map(move |o| (d.domain.as_str(), o)))
    }

    pub fn len(&self) -> usize {
        self.clinical_observations.iter().map(|d| d.observations.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn nuance_observations(&self) -> &[Observation] {
        self.clinical_observations
            .iter()
            .find(|d| d.domain == NARRATIVE_UNCERTAINTY_DOMAIN)
            .map(|d| d.observations.as_slice())
            .unwrap_or(&[])
    }

    /// Negated findings joined into one lower-cased string.
    pub fn negatives_text(&self) -> String {
        self.key_negatives.join(" ").to_lowercase()
    }
}

/// Domain list as a JSON object that keeps document order.
mod ordered_domains {
    use super::{DomainObservations, Observation, ObservationSet};
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(
        domains: &[DomainObservations],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(domains.len()))?;
        for d in domains {
            map.serialize_entry(&d.domain, &d.observations)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<DomainObservations>, D::Error> {
        deserializer.deserialize_map(DomainsVisitor)
    }

    struct DomainsVisitor;

    impl<'de> Visitor<'de> for DomainsVisitor {
        type Value = Vec<DomainObservations>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of domain name to observation list")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut set = ObservationSet::default();
            while let Some((domain, list)) = access.next_entry::<String, Vec<Observation>>()? {
                for obs in list {
                    set.add(&domain, obs);
                }
            }
            Ok(set.clinical_observations)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_order_follows_service_order() {
        let mut a = ObservationSet::default();
        a.add("ischemic_findings", Observation::new("CAD", "prior CAD"));
        a.add("infectious_signs", Observation::new("Fever", "febrile"));
        a.add("ischemic_findings", Observation::new("Stent", "prior stent"));

        let order: Vec<_> = a.iter().map(|(d, o)| (d, o.finding.as_str())).collect();
        assert_eq!(
            order,
            vec![
                ("ischemic_findings", "CAD"),
                ("ischemic_findings", "Stent"),
                ("infectious_signs", "Fever"),
            ]
        );
    }

    #[test]
    fn test_deserialize_keeps_document_order() {
        let json = r#"{
            "clinical_observations": {
                "ischemic_findings": [{"finding": "CAD"}],
                "infectious_signs": [{"finding": "Fever"}],
                "ischemic_findings": [{"finding": "Stent"}]
            }
        }"#;
        let set: ObservationSet = serde_json::from_str(json).unwrap();
        let domains: Vec<_> = set.clinical_observations.iter().map(|d| d.domain.as_str()).collect();
        assert_eq!(domains, vec!["ischemic_findings", "infectious_signs"]);
        assert_eq!(set.clinical_observations[0].observations.len(), 2);

        let back = serde_json::to_value(&set).unwrap();
        let keys: Vec<_> = back["clinical_observations"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys.len(), 2);
        assert!(set.key_negatives.is_empty());
    }

    #[test]
    fn test_deserialize_observation_service_output() {
        let json = r#"{
            "clinical_observations": {
                "infectious_signs": [
                    {"finding": "Fever", "context": "temp 39C", "confidence": "high"}
                ],
                "narrative_uncertainty": [
                    {"finding": "Biopsy not done", "context": "No biopsy"}
                ]
            },
            "key_negatives": ["Flu A/B negative"]
        }"#;
        let set: ObservationSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.nuance_observations().len(), 1);
        assert_eq!(set.nuance_observations()[0].confidence, ObservationConfidence::Moderate);
        assert_eq!(set.negatives_text(), "flu a/b negative");
    }

    #[test]
    fn test_match_text_joins_finding_and_quote() {
        let obs = Observation::new("Parvovirus IgM", "Parvovirus IgM POSITIVE");
        assert_eq!(obs.match_text(), "parvovirus igm parvovirus igm positive");
    }
}
