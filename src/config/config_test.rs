use super::*;

const SAMPLE: &str = r#"
info:
  version: 1.0.0
  description: SCTP load balancer
configuration:
  type: grpc
  services:
    - uri: amf.svc
    - uri: amf-standby.svc
  ngapIpList:
    - 127.0.0.1
    - 10.1.1.1
  ngappPort: 38412
  sctpGrpcPort: 9000
"#;

#[test]
fn test_parse_full_config() {
    let cfg = Config::parse(SAMPLE.as_bytes()).unwrap();

    let info = cfg.info.unwrap();
    assert_eq!(info.version.as_deref(), Some("1.0.0"));

    let c = cfg.configuration;
    assert_eq!(c.backend_type, "grpc");
    assert_eq!(c.services.len(), 2);
    assert_eq!(c.services[0].uri, "amf.svc");
    assert_eq!(c.ngap_ip_list, vec!["127.0.0.1", "10.1.1.1"]);
    assert_eq!(c.ngap_port, 38412);
    assert_eq!(c.sctp_grpc_port, 9000);
}

#[test]
fn test_missing_configuration_block_is_fatal() {
    let content = "info:\n  version: 1.0.0\n";
    let res = Config::parse(content.as_bytes());
    assert!(matches!(res, Err(Error::ErrMissingConfiguration)));
}

#[test]
fn test_ngap_port_defaults() {
    let content = r#"
configuration:
  type: grpc
  services:
    - uri: amf.svc
  sctpGrpcPort: 9000
"#;
    let cfg = Config::parse(content.as_bytes()).unwrap();
    assert_eq!(cfg.configuration.ngap_port, DEFAULT_NGAP_PORT);
    assert!(cfg.configuration.ngap_ip_list.is_empty());
}

#[test]
fn test_unparsable_yaml_is_an_error() {
    let res = Config::parse(b"configuration: [not, a, mapping");
    assert!(matches!(res, Err(Error::Yaml(_))));
}
