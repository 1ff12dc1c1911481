use reachscan::targets::{ipv4_to_default_cidr, parse_subnet, SubnetHosts};
use reachscan::{ScanError, WorkList};
use std::net::{IpAddr, Ipv4Addr};

#[test]
fn default_cidr_is_24() {
    let cidr = ipv4_to_default_cidr(Ipv4Addr::new(192, 168, 42, 99));
    assert_eq!(cidr.to_string(), "192.168.42.0/24");
}

#[test]
fn expand_excludes_network_and_broadcast() {
    let hosts = SubnetHosts::parse("10.0.0.0/30").unwrap();
    let list: Vec<_> = hosts.iter().collect();
    assert_eq!(
        list,
        vec![
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        ]
    );
}

#[test]
fn slash_24_has_254_hosts() {
    let hosts = SubnetHosts::parse("192.168.1.0/24").unwrap();
    assert_eq!(hosts.host_count(), 254);
    assert_eq!(hosts.iter().count(), 254);
}

#[test]
fn point_to_point_keeps_both_addresses() {
    let hosts = SubnetHosts::parse("10.0.0.0/31").unwrap();
    assert_eq!(hosts.host_count(), 2);
    assert_eq!(hosts.iter().count(), 2);
}

#[test]
fn malformed_subnet_fails_before_any_work_list_exists() {
    let res = SubnetHosts::parse("10.0.0.0/abc").map(|h| WorkList::hosts_on_port(h, 80));
    assert!(matches!(res, Err(ScanError::InvalidSubnetFormat { .. })));

    for bad in ["", "10.0.0.0/33", "300.1.1.1/24", "not-a-net"] {
        assert!(
            matches!(parse_subnet(bad), Err(ScanError::InvalidSubnetFormat { .. })),
            "{bad:?} should be rejected"
        );
    }
}

#[test]
fn discovery_work_list_pairs_every_host_with_port() {
    let hosts = SubnetHosts::parse("10.1.1.0/29").unwrap();
    let work = WorkList::hosts_on_port(hosts, 443);
    assert_eq!(work.len(), 6);
    assert!(work.iter().all(|e| e.port == 443));
    assert_eq!(work.as_slice()[0].ip, IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1)));
}
