use reachscan::ports::{load_ports_from_path, parse_ports_str, port_range};
use reachscan::ScanError;

#[test]
fn comma_lists_ranges_and_comments_mix_freely() {
    let spec = "443, 22,80-82\n\n  # web\n81,8443 # overlaps 80-82\n25-25,22";

    let ports = parse_ports_str(spec).expect("parse ok");
    assert_eq!(ports, vec![443, 22, 80, 81, 82, 8443, 25]);
}

#[test]
fn bad_item_in_comma_list_names_its_line() {
    let err = parse_ports_str("22,80\n443,http").unwrap_err();
    assert!(format!("{err:#}").contains("line 2"), "{err:#}");
}

#[test]
fn invalid_port_rejected() {
    let input = "0\n"; // invalid: out of range
    let err = parse_ports_str(input).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ScanError>(),
        Some(&ScanError::InvalidPort("0".into()))
    );
}

#[test]
fn linear_range_is_inclusive() {
    assert_eq!(port_range(1, 10).unwrap(), (1..=10).collect::<Vec<u16>>());
    assert_eq!(port_range(80, 80).unwrap(), vec![80]);
    assert_eq!(
        port_range(1024, 1),
        Err(ScanError::InvalidPortRange { start: 1024, end: 1 })
    );
}

#[test]
fn missing_ports_file_is_an_error() {
    let err = load_ports_from_path("/definitely/not/here/ports.txt").unwrap_err();
    assert!(err.to_string().contains("failed to read ports file"));
}

#[test]
fn ports_file_round_trip_through_disk() {
    let path = std::env::temp_dir().join(format!("reachscan-ports-{}.txt", std::process::id()));
    std::fs::write(&path, "22\n8080-8081 # dev\n").unwrap();
    let ports = load_ports_from_path(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert_eq!(ports, vec![22, 8080, 8081]);
}
