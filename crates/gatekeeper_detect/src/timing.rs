use std::time::Duration;

use crate::Verdict;

const REGULARITY_THRESHOLD: f64 = 0.3;
const MIN_SAMPLES: usize = 3;

/// Packet-timing detector (spec §4.4): a coefficient of variation
/// (std-dev / mean) below 0.3 across inter-packet deltas reads as
/// too-regular, machine-paced cadence.
pub fn packet_timing_verdict(inter_packet_deltas: &[Duration]) -> Verdict {
    if inter_packet_deltas.len() < MIN_SAMPLES {
        return Verdict::ok();
    }

    let millis: Vec<f64> = inter_packet_deltas
        .iter()
        .map(|d| d.as_secs_f64() * 1000.0)
        .collect();

    let mean = millis.iter().sum::<f64>() / millis.len() as f64;
    if mean == 0.0 {
        return Verdict::suspicious(1);
    }

    let variance =
        millis.iter().map(|m| (m - mean).powi(2)).sum::<f64>() / millis.len() as f64;
    let std_dev = variance.sqrt();
    let cv = std_dev / mean;

    if cv < REGULARITY_THRESHOLD {
        Verdict::suspicious(1)
    } else {
        Verdict::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_few_samples_is_never_flagged() {
        let deltas = vec![Duration::from_millis(100), Duration::from_millis(100)];
        assert_eq!(packet_timing_verdict(&deltas), Verdict::ok());
    }

    #[test]
    fn perfectly_regular_cadence_is_suspicious() {
        let deltas = vec![Duration::from_millis(50); 10];
        let verdict = packet_timing_verdict(&deltas);
        assert!(verdict.suspicious);
    }

    #[test]
    fn human_like_jitter_is_not_flagged() {
        let deltas = vec![
            Duration::from_millis(40),
            Duration::from_millis(120),
            Duration::from_millis(60),
            Duration::from_millis(200),
            Duration::from_millis(30),
            Duration::from_millis(150),
        ];
        assert_eq!(packet_timing_verdict(&deltas), Verdict::ok());
    }
}
