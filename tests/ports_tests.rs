use std::collections::BTreeSet;

use portmaster::ports::{parse_port_range, PortPlan, COMMON_PORTS};
use portmaster::types::{Algorithm, ProbeMethod, ScanConfig};

fn cfg(lo: u32, hi: u32, algorithm: Algorithm, common: bool) -> ScanConfig {
    ScanConfig::new("127.0.0.1", lo, hi, algorithm, ProbeMethod::Connect, common, 10).expect("valid config")
}

const RANGES: &[(u32, u32)] = &[(1, 1), (1, 5), (20, 30), (1, 1024), (440, 450), (8000, 8100), (65500, 65535)];

#[test]
fn plan_is_a_permutation_of_the_range() {
    for &(lo, hi) in RANGES {
        for algorithm in [Algorithm::Bfs, Algorithm::Dfs] {
            for common in [true, false] {
                let plan = PortPlan::build(&cfg(lo, hi, algorithm, common));
                let seq = plan.sequence();
                assert_eq!(seq.len(), (hi - lo + 1) as usize, "{lo}-{hi} {algorithm} {common}");
                let set: BTreeSet<u16> = seq.iter().copied().collect();
                assert_eq!(set.len(), seq.len(), "duplicates in {lo}-{hi}");
                let expected: BTreeSet<u16> = (lo as u16..=hi as u16).collect();
                assert_eq!(set, expected);
            }
        }
    }
}

#[test]
fn bfs_and_dfs_share_ports_but_not_order() {
    for &(lo, hi) in RANGES {
        let bfs = PortPlan::build(&cfg(lo, hi, Algorithm::Bfs, true));
        let dfs = PortPlan::build(&cfg(lo, hi, Algorithm::Dfs, true));
        let a: BTreeSet<u16> = bfs.sequence().iter().copied().collect();
        let b: BTreeSet<u16> = dfs.sequence().iter().copied().collect();
        assert_eq!(a, b);
        if hi > lo {
            assert_ne!(bfs.sequence(), dfs.sequence(), "{lo}-{hi}");
        } else {
            assert_eq!(bfs.sequence(), dfs.sequence());
        }
    }
}

#[test]
fn common_port_80_dispatched_before_non_common_ports() {
    let order: Vec<u16> = PortPlan::build(&cfg(1, 100, Algorithm::Bfs, true)).dispatch_order().collect();
    let pos_80 = order.iter().position(|&p| p == 80).unwrap();
    let first_plain = order.iter().position(|p| !COMMON_PORTS.contains(p)).unwrap();
    assert!(pos_80 < first_plain);
    assert_eq!(&order[..7], &[21, 22, 23, 25, 53, 80, 1]);
}

#[test]
fn common_ports_outside_range_are_ignored() {
    let plan = PortPlan::build(&cfg(1000, 1010, Algorithm::Bfs, true));
    assert_eq!(plan.sequence(), (1000..=1010).collect::<Vec<u16>>().as_slice());
}

#[test]
fn inverted_range_is_empty() {
    assert!(PortPlan::build(&cfg(5, 1, Algorithm::Dfs, true)).is_empty());
}

#[test]
fn parse_range_forms() {
    assert_eq!(parse_port_range("22").expect("parse ok"), (22, 22));
    assert_eq!(parse_port_range("1-65535").expect("parse ok"), (1, 65535));
}

#[test]
fn invalid_port_rejected() {
    assert!(parse_port_range("0").is_err());
    assert!(parse_port_range("1-70000").is_err());
    assert!(parse_port_range("http").is_err());
}
