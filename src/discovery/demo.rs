//! Synthetic candidates for staging environments without hardware
//!
//! Every record is flagged `demo_device`; none of the addresses exist.

use crate::models::DiscoveredCandidate;

pub const METHOD_TAG: &str = "demo_simulation";

pub fn synthetic_candidates() -> Vec<DiscoveredCandidate> {
    [
        ("192.168.1.101", "hikvision", "Hikvision Camera", "DS-2CD2143G0-I"),
        ("192.168.1.102", "dahua", "Dahua Camera", "IPC-HDW1230S"),
        ("192.168.1.103", "onvif", "ONVIF Camera", "Generic ONVIF Camera"),
    ]
    .into_iter()
    .filter_map(|(ip, guessed_type, name, model)| {
        let mut candidate = DiscoveredCandidate::new(ip.parse().ok()?, 80, METHOD_TAG)
            .with_guess(guessed_type, &[guessed_type]);
        candidate.requires_auth = true;
        candidate.device_name = Some(name.to_string());
        candidate.model = Some(model.to_string());
        candidate.demo_device = true;
        Some(candidate)
    })
    .collect()
}
