//! Incident fingerprinting for campaign clustering.
//!
//! A fingerprint is a stable digest of the dimensions along which incidents
//! cluster: attack vector, submitter region, ISO-week time bucket, and the
//! first two indicator values. Two incidents with equal fingerprints
//! plausibly belong to the same campaign.

use crate::types::{AttackVector, Ioc, Region};
use chrono::{DateTime, Datelike, Utc};
use sha2::{Digest, Sha256};

/// Number of leading indicators that participate in the fingerprint.
/// Indicators beyond this are ignored, keeping the key tolerant of partial
/// IOC overlap between submitters.
const FINGERPRINT_IOC_COUNT: usize = 2;

/// Compute the clustering fingerprint for an incident.
///
/// Deterministic under:
/// - time bucketed to the ISO calendar week (week-year + week number), so
///   incidents in the same week share a bucket regardless of day or time;
/// - the first two IOC values (by submission order) lowercased and then
///   lexicographically sorted, so the key is order-independent across those
///   two and ignores the rest.
///
/// Region is a clustering dimension here, not a privacy-suppressed one:
/// incidents from different regions never share a fingerprint.
pub fn fingerprint(
    attack_vector: AttackVector,
    region: Region,
    time_start: DateTime<Utc>,
    iocs: &[Ioc],
) -> String {
    let bucket = week_bucket(time_start);

    let mut values: Vec<String> = iocs
        .iter()
        .take(FINGERPRINT_IOC_COUNT)
        .map(|ioc| ioc.value.to_lowercase())
        .collect();
    values.sort();
    let joined = values.join(",");

    let material = format!("{attack_vector}|{region}|{bucket}|{joined}");
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Format the ISO week bucket, e.g. `2026-W10`.
///
/// Uses the ISO week-year rather than the calendar year so that a week
/// straddling January 1st stays a single bucket.
fn week_bucket(t: DateTime<Utc>) -> String {
    let week = t.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn identical_inputs_produce_identical_fingerprints() {
        let iocs = vec![Ioc::new("domain", "x.example.com")];
        let a = fingerprint(AttackVector::AiPhishing, Region::Eu, at(2026, 3, 2, 9), &iocs);
        let b = fingerprint(AttackVector::AiPhishing, Region::Eu, at(2026, 3, 2, 9), &iocs);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn same_week_different_days_share_a_bucket() {
        let iocs = vec![Ioc::new("domain", "x.example.com")];
        // 2026-03-02 is a Monday; 2026-03-04 is the Wednesday of the same week.
        let a = fingerprint(AttackVector::AiPhishing, Region::Eu, at(2026, 3, 2, 9), &iocs);
        let b = fingerprint(AttackVector::AiPhishing, Region::Eu, at(2026, 3, 4, 23), &iocs);
        assert_eq!(a, b);
    }

    #[test]
    fn first_two_iocs_are_order_independent() {
        let ab = vec![Ioc::new("domain", "A.example.com"), Ioc::new("ip", "10.0.0.1")];
        let ba = vec![Ioc::new("ip", "10.0.0.1"), Ioc::new("domain", "a.EXAMPLE.com")];
        let a = fingerprint(AttackVector::DeepfakeVoice, Region::NaWest, at(2026, 5, 5, 1), &ab);
        let b = fingerprint(AttackVector::DeepfakeVoice, Region::NaWest, at(2026, 5, 5, 1), &ba);
        assert_eq!(a, b);
    }

    #[test]
    fn third_ioc_does_not_matter() {
        let two = vec![Ioc::new("domain", "a.com"), Ioc::new("ip", "10.0.0.1")];
        let three = vec![
            Ioc::new("domain", "a.com"),
            Ioc::new("ip", "10.0.0.1"),
            Ioc::new("hash", "deadbeef"),
        ];
        let a = fingerprint(AttackVector::Other, Region::Apac, at(2026, 1, 13, 0), &two);
        let b = fingerprint(AttackVector::Other, Region::Apac, at(2026, 1, 13, 0), &three);
        assert_eq!(a, b);
    }

    #[test]
    fn region_is_a_clustering_dimension() {
        let iocs = vec![Ioc::new("domain", "x.example.com")];
        let eu = fingerprint(AttackVector::AiPhishing, Region::Eu, at(2026, 3, 2, 9), &iocs);
        let na = fingerprint(AttackVector::AiPhishing, Region::NaEast, at(2026, 3, 2, 9), &iocs);
        assert_ne!(eu, na);
    }

    #[test]
    fn different_weeks_do_not_share_a_bucket() {
        let iocs = vec![Ioc::new("domain", "x.example.com")];
        let w1 = fingerprint(AttackVector::AiPhishing, Region::Eu, at(2026, 3, 2, 9), &iocs);
        let w2 = fingerprint(AttackVector::AiPhishing, Region::Eu, at(2026, 3, 9, 9), &iocs);
        assert_ne!(w1, w2);
    }

    #[test]
    fn week_bucket_uses_iso_week_year_across_january_first() {
        // 2027-01-01 falls in ISO week 2026-W53; both sides of the new year
        // land in the same bucket.
        assert_eq!(week_bucket(at(2026, 12, 31, 12)), "2026-W53");
        assert_eq!(week_bucket(at(2027, 1, 1, 12)), "2026-W53");
    }
}
