use std::{collections::BTreeMap, net::Ipv4Addr};

use dojo_models::{
    templates::{
        CompletionReport, ExploitServer, ExploitedService, FindData, FindServices, ScanNetwork,
        StepBuilder, UpdateRouting,
    },
    types::{Content, Credential},
};

fn finished(result: &str, output: &str) -> CompletionReport {
    CompletionReport {
        result: Some(result.to_string()),
        state: Some("FINISHED".to_string()),
        output: output.to_string(),
        ..Default::default()
    }
}

#[test]
fn ping_sweep_reports_the_found_host() {
    let builder = ScanNetwork {
        target: "10.0.1.0/24".to_string(),
        session: 1,
    };
    let output = "[*] Performing ping sweep...\n[+] \t10.0.1.2 host found\n[*] Post module execution completed";

    assert_eq!(
        builder.processed_output(output),
        Content::Hosts(vec![Ipv4Addr::new(10, 0, 1, 2)])
    );
}

#[test]
fn port_scan_groups_open_ports_by_host() {
    let builder = FindServices {
        target: "10.0.1.2".to_string(),
        ports: "22".to_string(),
    };
    let output = "[+] 10.0.1.2: - 10.0.1.2:22 - TCP OPEN\n[*] Scanned 1 of 1 hosts (100% complete)";

    assert_eq!(
        builder.processed_output(output),
        Content::Services(BTreeMap::from([(Ipv4Addr::new(10, 0, 1, 2), vec![22])]))
    );
}

#[test]
fn directory_listing_keeps_line_order() {
    let builder = FindData {
        session: 1,
        directory: "/home/developer".to_string(),
    };
    let output = "/home/developer/\n/home/developer/.bash_logout\n/home/developer/.bashrc";

    assert_eq!(
        builder.processed_output(output),
        Content::Files(vec![
            "/home/developer/".to_string(),
            "/home/developer/.bash_logout".to_string(),
            "/home/developer/.bashrc".to_string(),
        ])
    );
}

#[test]
fn built_sweep_target_is_recovered_from_its_report() {
    let builder = ScanNetwork {
        target: "192.168.2.0/24".to_string(),
        session: 4,
    };
    let template = builder.build_template(12);
    assert_eq!(template.module_arguments()["module_options"]["RHOSTS"], "192.168.2.0/24");
    assert_eq!(template.module_arguments()["module_options"]["SESSION"], 4);

    let report = finished(
        "OK",
        "[*] Performing ping sweep for IP range 192.168.2.0/24\n\
         [+] \t192.168.2.10 host found\n\
         [+] \t192.168.2.12 host found\n",
    );
    assert!(builder.is_success(&report, &builder.default_sentinels()));
    assert_eq!(
        builder.processed_output(&report.output),
        Content::Hosts(vec![
            Ipv4Addr::new(192, 168, 2, 10),
            Ipv4Addr::new(192, 168, 2, 12),
        ])
    );
}

#[test]
fn autoroute_report_yields_prefix_subnets() {
    let builder = UpdateRouting { session: 2 };
    let report = finished(
        "OK",
        "[*] Running module against 192.168.2.12\n\
         [+] Route added to subnet 192.168.3.0/255.255.255.0 from host's routing table.\n\
         [+] Route added to subnet 192.168.2.0/24\n",
    );

    let Content::Subnets(subnets) = builder.processed_output(&report.output) else {
        panic!("autoroute output should parse to subnets");
    };
    let rendered: Vec<String> = subnets.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["192.168.3.0/24", "192.168.2.0/24"]);
}

#[test]
fn ssh_bruteforce_report_yields_credentials() {
    let builder = ExploitServer::new("192.168.2.10", ExploitedService::Ssh);
    let template = builder.build_template(3);
    assert_eq!(template.name, "exploit-server-3");
    assert_eq!(
        template.module_arguments()["module_options"]["USERNAME"],
        "developer"
    );

    let report = finished(
        "OK",
        "[+] 192.168.2.10:22 - Success: 'developer:developer' 'uid=1000(developer)'\n\
         [*] SSH session 3 opened (192.168.1.100:40000 -> 192.168.2.10:22)\n",
    );
    assert_eq!(report.session_id(), Some(3));
    assert_eq!(
        builder.processed_output(&report.output),
        Content::Credentials(vec![Credential {
            username: "developer".to_string(),
            password: "developer".to_string(),
        }])
    );
}

#[test]
fn parsing_twice_gives_the_same_content() {
    let builder = FindServices {
        target: "192.168.2.0/24".to_string(),
        ports: "1-1024".to_string(),
    };
    let output = "[+] 192.168.2.10: - 192.168.2.10:80 - TCP OPEN\n\
                  [+] 192.168.2.10: - 192.168.2.10:22 - TCP OPEN\n";

    assert_eq!(builder.processed_output(output), builder.processed_output(output));
}
