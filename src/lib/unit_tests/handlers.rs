// SPDX-License-Identifier: Apache-2.0

use std::os::unix::fs::PermissionsExt;

use super::testlib::{path, TestEnv};
use crate::{CommitOptions, ErrorKind, RtconfError};

fn messages(e: &RtconfError) -> Vec<String> {
    if e.causes().is_empty() {
        vec![e.msg().to_string()]
    } else {
        e.causes().iter().map(|c| c.msg().to_string()).collect()
    }
}

fn commit(env: &mut TestEnv) -> Result<Vec<String>, RtconfError> {
    env.engine
        .commit(&CommitOptions::new())
        .map(|r| r.handlers)
}

fn commit_error(env: &mut TestEnv, content: &str) -> RtconfError {
    env.candidate(content);
    let e = env.engine.commit(&CommitOptions::new()).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::ConfigError);
    e
}

#[test]
fn test_vrf_reserved_name() {
    let mut env = TestEnv::new();
    let e = commit_error(
        &mut env,
        "vrf {\n    name default {\n        table 100;\n    }\n}\n",
    );
    assert_eq!(e.msg(), "VRF name \"default\" is reserved");
    assert_eq!(e.path(), "vrf name default");
    assert_eq!(e.handler(), "vrf");
}

#[test]
fn test_vrf_table_not_unique() {
    let mut env = TestEnv::new();
    let e = commit_error(
        &mut env,
        r#"vrf {
    name blue {
        table 100;
    }
    name red {
        table 100;
    }
}
"#,
    );
    assert_eq!(
        e.msg(),
        "VRF \"red\" table id 100 is not unique, it is already used by \
        VRF \"blue\""
    );
    assert_eq!(e.path(), "vrf name red table");
}

#[test]
fn test_vrf_table_modification() {
    let mut env = TestEnv::new();
    env.candidate("vrf {\n    name red {\n        table 100;\n    }\n}\n");
    commit(&mut env).unwrap();

    env.engine
        .store_mut()
        .set(&path("vrf name red table"), Some("200"))
        .unwrap();
    let e = env.engine.commit(&CommitOptions::new()).unwrap_err();
    assert_eq!(e.msg(), "VRF \"red\" table id modification not allowed");
    assert_eq!(e.path(), "vrf name red table");
}

#[test]
fn test_vrf_bind_to_all() {
    let mut env = TestEnv::new();
    env.candidate(
        r#"vrf {
    bind-to-all;
    name red {
        description "customer red";
        table 100;
    }
}
"#,
    );
    commit(&mut env).unwrap();
    assert_eq!(env.sysctl("net.ipv4.tcp_l3mdev_accept"), "1");
    assert_eq!(env.sysctl("net.ipv4.udp_l3mdev_accept"), "1");
    assert!(env.runner.ran("ip link set dev red alias customer red"));
    assert!(env.runner.ran("ip link set dev red up"));

    env.engine.store_mut().delete(&path("vrf bind-to-all")).unwrap();
    commit(&mut env).unwrap();
    assert_eq!(env.sysctl("net.ipv4.tcp_l3mdev_accept"), "0");
}

const ROUTE_MAP_BINDING: &str = r#"interfaces {
    ethernet eth0 {
        address 192.0.2.1/24;
        policy {
            route-map RM;
        }
    }
}
policy {
    route-map RM {
        rule 10 {
            action permit;
            description "from lan";
            match {
                interface eth0;
            }
            set {
                local-preference 200;
            }
        }
    }
}
"#;

#[test]
fn test_ethernet_route_map_binding() {
    let mut env = TestEnv::new();
    env.candidate(ROUTE_MAP_BINDING);
    assert_eq!(
        commit(&mut env).unwrap(),
        vec!["policy", "interfaces_ethernet"]
    );

    let policy = env.read("/run/rtconf/frr/policy.frr").unwrap();
    assert!(policy.starts_with("### Autogenerated by rtconf ###\n"));
    assert!(policy.contains(
        "route-map RM permit 10\n description from lan\n match interface \
        eth0\n set local-preference 200\nexit\n!\n"
    ));
    let binding = env.read("/run/rtconf/frr/interface-policy.frr").unwrap();
    assert!(binding.contains("interface eth0\n ip policy route-map RM\nexit\n!\n"));

    assert!(env.runner.ran("ip link set dev eth0 mtu 1500"));
    assert!(env.runner.ran("ip address replace 192.0.2.1/24 dev eth0"));
    assert!(env.runner.ran("ip link set dev eth0 up"));
    assert!(env.runner.ran("systemctl reload-or-restart frr"));

    env.runner.clear_commands();
    env.engine
        .store_mut()
        .delete(&path("interfaces ethernet eth0 policy"))
        .unwrap();
    assert_eq!(commit(&mut env).unwrap(), vec!["interfaces_ethernet"]);
    assert!(!env.exists("/run/rtconf/frr/interface-policy.frr"));
    assert!(env.exists("/run/rtconf/frr/policy.frr"));
    assert!(env.runner.ran("systemctl reload-or-restart frr"));
}

#[test]
fn test_ethernet_address_change_without_reload() {
    let mut env = TestEnv::new();
    env.candidate(ROUTE_MAP_BINDING);
    commit(&mut env).unwrap();
    env.runner.clear_commands();

    let addr = path("interfaces ethernet eth0 address");
    env.engine
        .store_mut()
        .delete_value(&addr, "192.0.2.1/24")
        .unwrap();
    env.engine.store_mut().set(&addr, Some("198.51.100.1/24")).unwrap();
    commit(&mut env).unwrap();
    assert!(env.runner.ran("ip address del 192.0.2.1/24 dev eth0"));
    assert!(env.runner.ran("ip address replace 198.51.100.1/24 dev eth0"));
    assert!(!env.runner.ran("systemctl"));
}

#[test]
fn test_ethernet_missing_interface() {
    let mut env = TestEnv::new();
    let e = commit_error(
        &mut env,
        "interfaces {\n    ethernet eth7 {\n        mtu 9000;\n    }\n}\n",
    );
    assert_eq!(e.msg(), "Interface \"eth7\" does not exist");
    assert_eq!(e.path(), "interfaces ethernet eth7");
    assert_eq!(e.handler(), "interfaces_ethernet");
}

#[test]
fn test_ethernet_unknown_route_map() {
    let mut env = TestEnv::new();
    let e = commit_error(
        &mut env,
        r#"interfaces {
    ethernet eth0 {
        policy {
            route-map NOPE;
        }
    }
}
"#,
    );
    assert_eq!(e.msg(), "Specified route-map \"NOPE\" does not exist");
    assert_eq!(e.path(), "interfaces ethernet eth0 policy route-map");
}

#[test]
fn test_ethernet_removed_port_is_reset() {
    let mut env = TestEnv::new();
    env.candidate(
        "interfaces {\n    ethernet eth1 {\n        address 10.9.0.1/24;\n    }\n}\n",
    );
    commit(&mut env).unwrap();
    env.runner.clear_commands();

    env.engine.store_mut().delete(&path("interfaces")).unwrap();
    commit(&mut env).unwrap();
    assert_eq!(
        env.runner.commands(),
        vec![
            "ip link show dev eth1",
            "ip address flush dev eth1",
            "ip link set dev eth1 nomaster",
            "ip link set dev eth1 down",
        ]
    );
}

#[test]
fn test_ethernet_description_and_mac_removed() {
    let mut env = TestEnv::new();
    env.candidate(
        r#"interfaces {
    ethernet eth1 {
        description uplink;
        mac "02:00:00:00:00:01";
    }
}
"#,
    );
    commit(&mut env).unwrap();
    assert!(env.runner.ran("ip link set dev eth1 address 02:00:00:00:00:01"));
    assert!(env.runner.ran("ip link set dev eth1 alias uplink"));
    env.runner.clear_commands();

    env.runner
        .respond("ethtool -P eth1", "Permanent address: 52:54:00:AA:BB:01\n");
    env.engine
        .store_mut()
        .delete(&path("interfaces ethernet eth1 description"))
        .unwrap();
    env.engine
        .store_mut()
        .delete(&path("interfaces ethernet eth1 mac"))
        .unwrap();
    commit(&mut env).unwrap();
    let commands = env.runner.commands();
    assert!(commands.contains(&"ip link set dev eth1 alias ".to_string()));
    assert!(commands
        .contains(&"ip link set dev eth1 address 52:54:00:aa:bb:01".to_string()));

    // Settings absent on both sides are left alone
    env.runner.clear_commands();
    env.engine
        .store_mut()
        .set(&path("interfaces ethernet eth1 mtu"), Some("1400"))
        .unwrap();
    commit(&mut env).unwrap();
    assert!(!env.runner.ran("ip link set dev eth1 alias"));
    assert!(!env.runner.ran("ethtool"));
}

#[test]
fn test_dummy_mac_removed_without_permanent_address() {
    let mut env = TestEnv::new();
    env.candidate(
        "interfaces {\n    dummy dum0 {\n        mac \"02:00:00:00:00:02\";\n    }\n}\n",
    );
    commit(&mut env).unwrap();
    env.runner.clear_commands();

    env.runner
        .respond("ethtool -P dum0", "Permanent address: 00:00:00:00:00:00\n");
    env.engine
        .store_mut()
        .delete(&path("interfaces dummy dum0 mac"))
        .unwrap();
    commit(&mut env).unwrap();
    assert!(env.runner.ran("ethtool -P dum0"));
    assert!(!env.runner.ran("ip link set dev dum0 address"));
}

const BOND: &str = r#"interfaces {
    bonding bond0 {
        address 10.1.0.1/24;
        member {
            interface eth1;
            interface eth2;
        }
        mode active-backup;
    }
}
"#;

#[test]
fn test_bonding_create() {
    let mut env = TestEnv::new();
    env.candidate(BOND);
    assert_eq!(commit(&mut env).unwrap(), vec!["interfaces_bonding"]);

    let add = env
        .runner
        .position("ip link add dev bond0 type bond mode active-backup");
    let enslave = env.runner.position("ip link set dev eth1 master bond0");
    assert!(add.is_some());
    assert!(add < enslave);
    assert!(env.runner.position("ip link set dev eth1 down") < enslave);
    assert!(env.runner.ran("ip link set dev eth2 master bond0"));
    assert!(env.runner.ran("ip address replace 10.1.0.1/24 dev bond0"));
    // Members are left to the bond, nothing moves bond0 under a VRF
    assert!(env.runner.ran("ip link set dev bond0 nomaster"));
    assert!(!env.runner.ran("ip link set dev eth1 nomaster"));
}

#[test]
fn test_bonding_mode_and_member_change() {
    let mut env = TestEnv::new();
    env.candidate(BOND);
    commit(&mut env).unwrap();
    env.runner.clear_commands();

    let store = env.engine.store_mut();
    store
        .set(&path("interfaces bonding bond0 mode"), Some("transmit-load-balance"))
        .unwrap();
    store
        .delete_value(&path("interfaces bonding bond0 member interface"), "eth2")
        .unwrap();
    commit(&mut env).unwrap();

    let down = env.runner.position("ip link set dev bond0 down");
    let mode = env
        .runner
        .position("ip link set dev bond0 type bond mode balance-tlb");
    assert!(down.is_some());
    assert!(down < mode);
    assert!(env.runner.ran("ip link set dev eth2 nomaster"));
    assert!(!env.runner.ran("ip link add"));
}

#[test]
fn test_bonding_member_errors() {
    let mut env = TestEnv::new();
    let e = commit_error(
        &mut env,
        r#"interfaces {
    bonding bond0 {
        member {
            interface bond0;
            interface eth1;
            interface eth9;
        }
    }
    ethernet eth1 {
        address 192.0.2.1/24;
    }
}
"#,
    );
    let msgs = messages(&e);
    assert!(msgs.contains(&"Interface bond0 cannot be a member of itself".to_string()));
    assert!(msgs.contains(&"Interface \"eth9\" does not exist".to_string()));
    assert!(msgs.contains(
        &"Cannot assign an address to interface eth1 as it is a member of \
        bond0"
            .to_string()
    ));
}

#[test]
fn test_bridge_create() {
    let mut env = TestEnv::new();
    env.candidate(
        r#"interfaces {
    bridge br0 {
        aging 600;
        member {
            interface eth1 {
                cost 10;
                priority 5;
            }
            interface eth2 {
            }
        }
        stp;
    }
}
"#,
    );
    assert_eq!(commit(&mut env).unwrap(), vec!["interfaces_bridge"]);
    assert!(env.runner.ran("ip link add dev br0 type bridge"));
    assert!(env.runner.ran(
        "ip link set dev br0 type bridge stp_state 1 ageing_time 60000"
    ));
    assert!(env.runner.ran("ip link set dev eth1 master br0"));
    assert!(env.runner.ran("bridge link set dev eth1 cost 10 priority 5"));
    assert!(env.runner.ran("ip link set dev eth2 master br0"));
    assert!(!env.runner.ran("bridge link set dev eth2"));
    assert!(env.runner.ran("ip link set dev br0 up"));
}

#[test]
fn test_bridge_member_removed() {
    let mut env = TestEnv::new();
    env.candidate(
        r#"interfaces {
    bridge br0 {
        member {
            interface eth1 {
            }
            interface eth2 {
            }
        }
    }
}
"#,
    );
    commit(&mut env).unwrap();
    assert!(env.runner.ran(
        "ip link set dev br0 type bridge stp_state 0 ageing_time 30000"
    ));
    env.runner.clear_commands();

    env.engine
        .store_mut()
        .delete(&path("interfaces bridge br0 member interface eth2"))
        .unwrap();
    commit(&mut env).unwrap();
    assert!(env.runner.ran("ip link set dev eth2 nomaster"));
    assert!(!env.runner.ran("ip link add"));

    env.engine.store_mut().delete(&path("interfaces")).unwrap();
    commit(&mut env).unwrap();
    assert!(env.runner.ran("ip link delete dev br0"));
    assert!(!env.runner.has_link("br0"));
}

const FIREWALL: &str = r#"firewall {
    ipv4 {
        input {
            filter {
                default-action drop;
                rule 10 {
                    action accept;
                    state established;
                    state related;
                }
                rule 20 {
                    action jump;
                    destination {
                        port "22,2222";
                    }
                    inbound-interface {
                        name eth0;
                    }
                    jump-target SSH;
                    protocol tcp;
                }
                rule 30 {
                    action drop;
                    disable;
                }
            }
        }
        name SSH {
            rule 10 {
                action accept;
                log;
                source {
                    address 192.0.2.0/24;
                }
            }
        }
    }
}
"#;

#[test]
fn test_firewall_ruleset() {
    let mut env = TestEnv::new();
    env.candidate(FIREWALL);
    assert_eq!(commit(&mut env).unwrap(), vec!["firewall"]);

    let conf = env.read("/run/rtconf/nftables.conf").unwrap();
    assert!(conf.contains(
        "table ip rtconf_filter\ndelete table ip rtconf_filter\n"
    ));
    assert!(conf.contains(
        "    chain input {\n        type filter hook input priority filter; \
        policy accept;\n"
    ));
    assert!(conf.contains(
        "        ct state { established, related } counter accept comment \
        \"input-10\"\n"
    ));
    assert!(conf.contains(
        "        iifname \"eth0\" meta l4proto tcp tcp dport { 22, 2222 } \
        counter jump NAME_SSH comment \"input-20\"\n"
    ));
    assert!(!conf.contains("input-30"));
    assert!(conf.contains(
        "        counter drop comment \"input default-action\"\n"
    ));
    assert!(conf.contains("    chain NAME_SSH {\n"));
    assert!(conf.contains(
        "        ip saddr 192.0.2.0/24 counter log prefix \"[NAME_SSH-10]\" \
        accept comment \"NAME_SSH-10\"\n"
    ));
    assert!(conf.contains(
        "        counter accept comment \"NAME_SSH default-action\"\n"
    ));
    assert!(conf.find("chain input") < conf.find("chain NAME_SSH"));

    let mode = std::fs::metadata(env.root().join("run/rtconf/nftables.conf"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
    let load = format!(
        "nft -f {}",
        env.root().join("run/rtconf/nftables.conf").display()
    );
    assert_eq!(env.runner.commands(), vec![load]);
}

#[test]
fn test_firewall_removed() {
    let mut env = TestEnv::new();
    env.candidate(FIREWALL);
    commit(&mut env).unwrap();
    env.runner.clear_commands();

    env.engine.store_mut().delete(&path("firewall")).unwrap();
    commit(&mut env).unwrap();
    assert_eq!(
        env.runner.commands(),
        vec!["nft delete table ip rtconf_filter"]
    );
    assert!(!env.exists("/run/rtconf/nftables.conf"));
}

#[test]
fn test_firewall_rule_errors() {
    let mut env = TestEnv::new();
    let e = commit_error(
        &mut env,
        r#"firewall {
    ipv4 {
        forward {
            filter {
                rule 1 {
                    action jump;
                    jump-target NOPE;
                }
                rule 2 {
                    destination {
                        port 80;
                    }
                }
                rule 3 {
                    action accept;
                    outbound-interface {
                        name eth9;
                    }
                }
                rule 4 {
                    action jump;
                }
            }
        }
    }
}
"#,
    );
    assert_eq!(
        messages(&e),
        vec![
            "Invalid jump-target. Firewall name NOPE does not exist on the \
            system",
            "Firewall rule 2 of forward has no action defined",
            "Protocol must be tcp, udp or tcp_udp when specifying a port",
            "Interface \"eth9\" does not exist",
            "Action is set to jump, but no jump-target is specified",
        ]
    );
    assert_eq!(
        e.causes()[0].path(),
        "firewall ipv4 forward filter rule 1 jump-target"
    );
    assert_eq!(
        e.causes()[3].path(),
        "firewall ipv4 forward filter rule 3 outbound-interface name"
    );
    assert!(e.causes().iter().all(|c| c.handler() == "firewall"));
}

const DNS_FORWARDING: &str = r#"service {
    dns {
        forwarding {
            allow-from 192.0.2.0/24;
            listen-address 192.0.2.1;
            name-server 9.9.9.9;
            system;
        }
    }
}
system {
    name-server 1.1.1.1;
    name-server 9.9.9.9;
}
"#;

#[test]
fn test_dns_forwarding() {
    let mut env = TestEnv::new();
    env.candidate(DNS_FORWARDING);
    assert_eq!(
        commit(&mut env).unwrap(),
        vec!["system_host_name", "service_dns_forwarding"]
    );

    let conf = env.read("/run/pdns-recursor/recursor.conf").unwrap();
    for line in [
        "allow-from=192.0.2.0/24\n",
        "local-address=192.0.2.1\n",
        "local-port=53\n",
        "max-cache-entries=10000\n",
        "max-negative-ttl=3600\n",
        "dnssec=process-no-validate\n",
        "forward-zones-recurse=.=9.9.9.9;1.1.1.1\n",
    ] {
        assert!(conf.contains(line), "missing {line:?} in {conf}");
    }
    assert!(env.runner.ran("systemctl reload-or-restart pdns-recursor"));

    env.runner.clear_commands();
    env.engine
        .store_mut()
        .delete(&path("service dns forwarding"))
        .unwrap();
    commit(&mut env).unwrap();
    assert!(env.runner.ran("systemctl stop pdns-recursor"));
    assert!(!env.exists("/run/pdns-recursor/recursor.conf"));
}

#[test]
fn test_dns_forwarding_follows_system_name_servers() {
    let mut env = TestEnv::new();
    env.candidate(DNS_FORWARDING);
    commit(&mut env).unwrap();

    env.engine
        .store_mut()
        .delete_value(&path("system name-server"), "1.1.1.1")
        .unwrap();
    let handlers = commit(&mut env).unwrap();
    assert!(handlers.iter().any(|h| h == "service_dns_forwarding"));
    let conf = env.read("/run/pdns-recursor/recursor.conf").unwrap();
    assert!(conf.contains("forward-zones-recurse=.=9.9.9.9\n"));
}

#[test]
fn test_name_servers_without_dns_forwarding() {
    let mut env = TestEnv::new();
    env.runner
        .fail_on("systemctl stop pdns-recursor", 5, "Unit not loaded");
    env.candidate("system {\n    host-name r1;\n    name-server 192.0.2.53;\n}\n");
    assert_eq!(commit(&mut env).unwrap(), vec!["system_host_name"]);
    assert_eq!(env.runner.commands(), vec!["hostname r1"]);

    env.runner.clear_commands();
    env.engine
        .store_mut()
        .set(&path("system name-server"), Some("192.0.2.54"))
        .unwrap();
    assert_eq!(commit(&mut env).unwrap(), vec!["system_host_name"]);
    assert!(!env.runner.ran("systemctl stop pdns-recursor"));
}

#[test]
fn test_dns_forwarding_removal_renders_before_stop() {
    let mut env = TestEnv::new();
    env.candidate(DNS_FORWARDING);
    commit(&mut env).unwrap();

    env.runner
        .fail_on("systemctl stop pdns-recursor", 5, "Unit busy");
    env.engine
        .store_mut()
        .delete(&path("service dns forwarding"))
        .unwrap();
    let e = commit(&mut env).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::ApplyError);
    assert_eq!(e.handler(), "service_dns_forwarding");
    assert!(!env.exists("/run/pdns-recursor/recursor.conf"));
}

#[test]
fn test_dns_forwarding_errors() {
    let mut env = TestEnv::new();
    let e = commit_error(
        &mut env,
        r#"service {
    dns {
        forwarding {
            cache-size 100;
            system;
        }
    }
}
"#,
    );
    assert_eq!(
        messages(&e),
        vec![
            "DNS forwarding requires an allow-from network",
            "DNS forwarding requires a listen-address",
            "DNS forwarding \"system\" is set, but no system name-server is \
            configured",
        ]
    );
}

const DHCP_SERVER: &str = r#"service {
    dhcp-server {
        listen-interface eth0;
        shared-network-name LAN {
            subnet 192.0.2.0/24 {
                default-router 192.0.2.1;
                name-server 192.0.2.1;
                range 0 {
                    start 192.0.2.100;
                    stop 192.0.2.199;
                }
                static-mapping printer {
                    ip-address 192.0.2.10;
                    mac "00:11:22:33:44:55";
                }
                subnet-id 1;
            }
        }
    }
}
"#;

#[test]
fn test_dhcp_server() {
    let mut env = TestEnv::new();
    env.candidate(DHCP_SERVER);
    assert_eq!(commit(&mut env).unwrap(), vec!["service_dhcp_server"]);
    assert!(env.runner.ran("systemctl restart kea-dhcp4-server"));

    let conf = env.read("/run/kea/kea-dhcp4.conf").unwrap();
    let json: String = conf
        .lines()
        .filter(|l| !l.starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");
    let kea: serde_json::Value = serde_json::from_str(&json).unwrap();
    let dhcp4 = &kea["Dhcp4"];
    assert_eq!(
        dhcp4["interfaces-config"]["interfaces"],
        serde_json::json!(["eth0"])
    );
    assert_eq!(
        dhcp4["lease-database"]["name"],
        "/config/dhcp/dhcp4-leases.csv"
    );
    let network = &dhcp4["shared-networks"][0];
    assert_eq!(network["name"], "LAN");
    let subnet = &network["subnet4"][0];
    assert_eq!(subnet["id"], 1);
    assert_eq!(subnet["subnet"], "192.0.2.0/24");
    assert_eq!(subnet["valid-lifetime"], 86400);
    assert_eq!(
        subnet["option-data"],
        serde_json::json!([
            {"name": "routers", "data": "192.0.2.1"},
            {"name": "domain-name-servers", "data": "192.0.2.1"},
        ])
    );
    assert_eq!(
        subnet["pools"],
        serde_json::json!([{"pool": "192.0.2.100 - 192.0.2.199"}])
    );
    assert_eq!(
        subnet["reservations"],
        serde_json::json!([{
            "hostname": "printer",
            "hw-address": "00:11:22:33:44:55",
            "ip-address": "192.0.2.10",
        }])
    );
}

#[test]
fn test_dhcp_server_disabled() {
    let mut env = TestEnv::new();
    env.candidate(DHCP_SERVER);
    commit(&mut env).unwrap();
    env.runner.clear_commands();

    env.engine
        .store_mut()
        .set(&path("service dhcp-server disable"), None)
        .unwrap();
    commit(&mut env).unwrap();
    assert_eq!(
        env.runner.commands(),
        vec!["systemctl stop kea-dhcp4-server"]
    );
    assert!(!env.exists("/run/kea/kea-dhcp4.conf"));
}

#[test]
fn test_dhcp_server_disabled_removes_config_before_stop() {
    let mut env = TestEnv::new();
    env.candidate(DHCP_SERVER);
    commit(&mut env).unwrap();

    env.runner
        .fail_on("systemctl stop kea-dhcp4-server", 1, "Unit busy");
    env.engine
        .store_mut()
        .set(&path("service dhcp-server disable"), None)
        .unwrap();
    let e = commit(&mut env).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::ApplyError);
    assert_eq!(e.handler(), "service_dhcp_server");
    assert!(!env.exists("/run/kea/kea-dhcp4.conf"));
}

#[test]
fn test_dhcp_server_errors() {
    let mut env = TestEnv::new();
    let e = commit_error(
        &mut env,
        r#"service {
    dhcp-server {
        shared-network-name LAN {
            subnet 192.0.2.0/24 {
                default-router 198.51.100.1;
                range 0 {
                    start 192.0.2.100;
                    stop 192.0.2.199;
                }
                range 1 {
                    start 192.0.2.150;
                    stop 192.0.2.160;
                }
                static-mapping a {
                    ip-address 192.0.2.10;
                    mac "00:11:22:33:44:55";
                }
                static-mapping b {
                    ip-address 192.0.2.11;
                    mac "00:11:22:33:44:55";
                }
            }
            subnet 192.0.2.128/25 {
                subnet-id 2;
            }
        }
    }
}
"#,
    );
    assert_eq!(
        messages(&e),
        vec![
            "Missing subnet-id in subnet 192.0.2.0/24",
            "Default router 198.51.100.1 is not inside subnet 192.0.2.0/24",
            "Range 1 overlaps range 0",
            "MAC address 00:11:22:33:44:55 is used by static mappings a and b",
            "Conflicting subnets: 192.0.2.128/25 overlaps 192.0.2.0/24",
        ]
    );
    assert_eq!(
        e.causes()[3].path(),
        "service dhcp-server shared-network-name LAN subnet 192.0.2.0/24 \
        static-mapping b mac"
    );
}

#[test]
fn test_host_name_files() {
    let mut env = TestEnv::new();
    env.candidate(
        r#"system {
    domain-name example.com;
    domain-search lab.example.com;
    host-name r1;
    name-server 192.0.2.53;
    static-host-mapping {
        host-name web {
            alias www;
            inet 192.0.2.10;
        }
    }
}
"#,
    );
    assert_eq!(commit(&mut env).unwrap(), vec!["system_host_name"]);
    assert_eq!(env.read("/etc/hostname").unwrap().trim(), "r1");

    let hosts = env.read("/etc/hosts").unwrap();
    assert!(hosts.contains("127.0.1.1       r1.example.com r1\n"));
    assert!(hosts.contains("192.0.2.10\tweb www\n"));
    let resolv = env.read("/etc/resolv.conf").unwrap();
    assert!(resolv.contains("nameserver 192.0.2.53\n"));
    assert!(resolv.contains("domain example.com\n"));
    assert!(resolv.contains("search lab.example.com\n"));

    let mode = std::fs::metadata(env.root().join("etc/hosts"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o644);
    assert_eq!(env.runner.commands(), vec!["hostname r1"]);
}

#[test]
fn test_host_name_default() {
    let mut env = TestEnv::new();
    env.candidate("system {\n    name-server 192.0.2.53;\n}\n");
    commit(&mut env).unwrap();
    assert_eq!(env.read("/etc/hostname").unwrap().trim(), "router");
    assert!(env.read("/etc/hosts").unwrap().contains("127.0.1.1       router\n"));
    assert!(env.runner.ran("hostname router"));
}

#[test]
fn test_host_name_errors() {
    let mut env = TestEnv::new();
    let e = commit_error(
        &mut env,
        r#"system {
    domain-name "bad..domain";
    host-name "bad-";
    static-host-mapping {
        host-name web {
            alias www;
        }
    }
}
"#,
    );
    assert_eq!(
        messages(&e),
        vec![
            "Invalid host name \"bad-\", it must be 1 to 63 letters, digits \
            or inner hyphens",
            "Invalid domain name \"bad..domain\"",
            "IP address required for static mapping web",
        ]
    );
    assert_eq!(e.causes()[0].path(), "system host-name");
}

#[test]
fn test_route_map_errors_and_removal() {
    let mut env = TestEnv::new();
    let e = commit_error(
        &mut env,
        r#"policy {
    route-map RM {
        rule 10 {
            match {
                interface eth9;
            }
        }
    }
}
"#,
    );
    assert_eq!(
        messages(&e),
        vec![
            "Action not set for route-map RM rule 10",
            "Interface \"eth9\" does not exist",
        ]
    );

    env.candidate(
        "policy {\n    route-map RM {\n        rule 10 {\n            action deny;\n        }\n    }\n}\n",
    );
    commit(&mut env).unwrap();
    assert!(env
        .read("/run/rtconf/frr/policy.frr")
        .unwrap()
        .contains("route-map RM deny 10\nexit\n!\n"));
    env.runner.clear_commands();

    env.engine.store_mut().delete(&path("policy")).unwrap();
    assert_eq!(commit(&mut env).unwrap(), vec!["policy"]);
    assert!(!env.exists("/run/rtconf/frr/policy.frr"));
    assert_eq!(
        env.runner.commands(),
        vec!["systemctl reload-or-restart frr"]
    );
}
