use crate::probe::latency::RegionMeasurement;
use crate::severity::{classify, worst, Severity, Thresholds};

/// Overall severity of a run.
///
/// The worst of the maintenance state, the classified average latency of
/// every region, and `info` when known issues were active in the last day.
/// Platform rows are reported alongside but do not contribute.
pub fn aggregate(
    maintenance: Severity,
    regions: &[RegionMeasurement],
    thresholds: &Thresholds,
    known_issues_24h: Option<usize>,
) -> Severity {
    let regional = regions.iter().map(|r| classify(r.stats.avg, thresholds));
    let known_issues = match known_issues_24h {
        Some(n) if n > 0 => Severity::Info,
        _ => Severity::Ok,
    };

    worst(std::iter::once(maintenance).chain(regional).chain(std::iter::once(known_issues)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(name: &str, samples: &[Option<f64>]) -> RegionMeasurement {
        RegionMeasurement::from_samples(name, samples)
    }

    #[test]
    fn test_all_healthy_is_ok() {
        let regions = [region("EU", &[Some(20.0)]), region("NA", &[Some(80.0)])];
        let t = Thresholds::default();
        assert_eq!(aggregate(Severity::Ok, &regions, &t, Some(0)), Severity::Ok);
        assert_eq!(aggregate(Severity::Ok, &regions, &t, None), Severity::Ok);
    }

    #[test]
    fn test_known_issues_raise_info() {
        let regions = [region("EU", &[Some(20.0)])];
        let t = Thresholds::default();
        assert_eq!(aggregate(Severity::Ok, &regions, &t, Some(3)), Severity::Info);
    }

    #[test]
    fn test_unreachable_region_dominates() {
        let regions = [region("EU", &[Some(450.0)]), region("ASIA", &[None, None])];
        let t = Thresholds::default();
        assert_eq!(
            aggregate(Severity::Warn, &regions, &t, Some(1)),
            Severity::Unknown
        );
    }

    #[test]
    fn test_maintenance_warn() {
        let regions = [region("EU", &[Some(250.0)])];
        let t = Thresholds::default();
        assert_eq!(aggregate(Severity::Warn, &regions, &t, None), Severity::Warn);
    }

    #[test]
    fn test_no_regions() {
        let t = Thresholds::default();
        assert_eq!(aggregate(Severity::Ok, &[], &t, None), Severity::Ok);
        assert_eq!(
            aggregate(Severity::Unknown, &[], &t, None),
            Severity::Unknown
        );
    }

    #[test]
    fn test_matches_worst_of_parts() {
        let t = Thresholds::default();
        let latencies = [None, Some(10.0), Some(250.0), Some(900.0)];
        for maintenance in Severity::ALL {
            for a in latencies {
                for b in latencies {
                    for ki in [None, Some(0), Some(2)] {
                        let regions = [region("EU", &[a]), region("NA", &[b])];
                        let expected = [
                            maintenance,
                            classify(a, &t),
                            classify(b, &t),
                            if ki.unwrap_or(0) > 0 {
                                Severity::Info
                            } else {
                                Severity::Ok
                            },
                        ]
                        .into_iter()
                        .max()
                        .unwrap_or(Severity::Ok);
                        assert_eq!(aggregate(maintenance, &regions, &t, ki), expected);
                    }
                }
            }
        }
    }
}
