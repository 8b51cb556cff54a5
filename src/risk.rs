//! Deterministic risk scoring over the harness crypto posture.
//!
//! Pure and side-effect free: the same posture always yields the same
//! assessment, so callers may cache per input. Checks run in a fixed order
//! and each contributes one finding string whether it passes or not.

use serde::Serialize;

use crate::system::SystemState;

/// Transport identifier that earns the full transport weight.
const PQ_TRANSPORT: &str = "KEMTLS";
/// KEM family accepted as NIST-standard post-quantum.
const PQ_KEM_FAMILY: &str = "kyber";
/// Signature families accepted as post-quantum.
const PQ_SIGNATURE_FAMILIES: [&str; 2] = ["dilithium", "falcon"];

const TRANSPORT_WEIGHT: u8 = 50;
const KEM_WEIGHT: u8 = 25;
const SIGNATURE_WEIGHT: u8 = 20;
const HASH_WEIGHT: u8 = 5;

/// Label tier for a risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLabel {
    QuantumSafe,
    Transitional,
    HighRisk,
}

impl RiskLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLabel::QuantumSafe => "Quantum-Safe",
            RiskLabel::Transitional => "Transitional Security",
            RiskLabel::HighRisk => "High Quantum Risk",
        }
    }
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived security assessment. Recomputed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    /// 0 to 100, additive weighted model.
    pub score: u8,
    /// One finding per check, in evaluation order.
    pub findings: Vec<String>,
    pub label: RiskLabel,
}

/// Score a posture snapshot.
pub fn assess(state: &SystemState) -> RiskAssessment {
    let mut score: u32 = 0;
    let mut findings = Vec::with_capacity(4);

    if state.transport.as_deref() == Some(PQ_TRANSPORT) {
        score += u32::from(TRANSPORT_WEIGHT);
        findings.push("KEMTLS used for transport security".to_string());
    } else {
        findings.push("Non-post-quantum transport detected".to_string());
    }

    if contains_family(state.kem.as_deref(), &[PQ_KEM_FAMILY]) {
        score += u32::from(KEM_WEIGHT);
        findings.push("NIST-standard post-quantum KEM in use".to_string());
    } else {
        findings.push("Non-standard or missing KEM".to_string());
    }

    if contains_family(state.signature.as_deref(), &PQ_SIGNATURE_FAMILIES) {
        score += u32::from(SIGNATURE_WEIGHT);
        findings.push("Post-quantum digital signature scheme in use".to_string());
    } else {
        findings.push("Non-post-quantum signature scheme detected".to_string());
    }

    if state.hash.as_deref().is_some_and(|h| !h.is_empty()) {
        score += u32::from(HASH_WEIGHT);
        findings.push("Modern cryptographic hash function configured".to_string());
    }

    let score = score.min(100) as u8;
    RiskAssessment {
        score,
        findings,
        label: label_for(score),
    }
}

/// Map a score to its label tier by fixed thresholds.
pub fn label_for(score: u8) -> RiskLabel {
    if score >= 85 {
        RiskLabel::QuantumSafe
    } else if score >= 60 {
        RiskLabel::Transitional
    } else {
        RiskLabel::HighRisk
    }
}

fn contains_family(name: Option<&str>, families: &[&str]) -> bool {
    let Some(name) = name else { return false };
    let name = name.to_lowercase();
    families.iter().any(|family| name.contains(family))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posture(
        transport: Option<&str>,
        kem: Option<&str>,
        signature: Option<&str>,
        hash: Option<&str>,
    ) -> SystemState {
        SystemState {
            status: None,
            transport: transport.map(String::from),
            kem: kem.map(String::from),
            signature: signature.map(String::from),
            hash: hash.map(String::from),
        }
    }

    #[test]
    fn full_post_quantum_stack_scores_100() {
        let assessment = assess(&posture(
            Some("KEMTLS"),
            Some("Kyber768"),
            Some("Dilithium3"),
            Some("SHA3-256"),
        ));
        assert_eq!(assessment.score, 100);
        assert_eq!(assessment.label, RiskLabel::QuantumSafe);
        assert_eq!(assessment.findings.len(), 4);
    }

    #[test]
    fn classical_stack_scores_0() {
        let assessment = assess(&posture(Some("TLS1.3"), Some("ECDH"), Some("ECDSA"), None));
        assert_eq!(assessment.score, 0);
        assert_eq!(assessment.label, RiskLabel::HighRisk);
        // Failed checks still contribute findings; the absent hash does not.
        assert_eq!(assessment.findings.len(), 3);
    }

    #[test]
    fn kem_match_is_case_insensitive() {
        let assessment = assess(&posture(None, Some("KYBER-1024"), None, None));
        assert_eq!(assessment.score, 25);
    }

    #[test]
    fn falcon_counts_as_post_quantum_signature() {
        let assessment = assess(&posture(None, None, Some("Falcon-512"), None));
        assert_eq!(assessment.score, 20);
    }

    #[test]
    fn label_thresholds() {
        assert_eq!(label_for(100), RiskLabel::QuantumSafe);
        assert_eq!(label_for(85), RiskLabel::QuantumSafe);
        assert_eq!(label_for(84), RiskLabel::Transitional);
        assert_eq!(label_for(60), RiskLabel::Transitional);
        assert_eq!(label_for(59), RiskLabel::HighRisk);
        assert_eq!(label_for(0), RiskLabel::HighRisk);
    }

    #[test]
    fn findings_preserve_evaluation_order() {
        let assessment = assess(&posture(Some("KEMTLS"), Some("ECDH"), None, Some("SHA-256")));
        assert_eq!(assessment.findings[0], "KEMTLS used for transport security");
        assert_eq!(assessment.findings[1], "Non-standard or missing KEM");
        assert_eq!(
            assessment.findings[2],
            "Non-post-quantum signature scheme detected"
        );
    }

    #[test]
    fn same_input_same_output() {
        let state = posture(Some("KEMTLS"), Some("Kyber768"), None, None);
        assert_eq!(assess(&state), assess(&state));
    }
}
