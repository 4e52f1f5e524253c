//! Security policy check — TLS on privileged ports, certificate expiry.

use armada_types::{ConfigSpec, ValidationContext};

use crate::report::{CheckCategory, ValidationError};

/// Ports below this require TLS.
const PRIVILEGED_PORT_MAX: u16 = 1024;

pub fn check(spec: &ConfigSpec, ctx: &ValidationContext) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for listener in &spec.listeners {
        match &listener.tls {
            None => {
                if listener.port < PRIVILEGED_PORT_MAX {
                    errors.push(ValidationError::new(
                        CheckCategory::Security,
                        &listener.name,
                        "tls",
                        format!(
                            "listener on privileged port {} requires TLS",
                            listener.port
                        ),
                    ));
                }
            }
            Some(tls) => {
                if let Some(&expiry) = ctx.cert_expiry.get(&tls.cert_name) {
                    if expiry <= ctx.now {
                        errors.push(ValidationError::new(
                            CheckCategory::Security,
                            &listener.name,
                            "cert_name",
                            format!("certificate {:?} has expired", tls.cert_name),
                        ));
                    }
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use armada_types::*;
    use std::collections::HashMap;

    fn listener(port: u16, tls: Option<TlsSpec>) -> ConfigSpec {
        ConfigSpec {
            listeners: vec![ListenerSpec {
                name: "ingress".to_string(),
                address: "0.0.0.0".to_string(),
                port,
                route_config: "r".to_string(),
                tls,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn privileged_port_requires_tls() {
        let errors = check(&listener(443, None), &ValidationContext::default());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("requires TLS"));
    }

    #[test]
    fn high_port_without_tls_passes() {
        let errors = check(&listener(8080, None), &ValidationContext::default());
        assert!(errors.is_empty());
    }

    #[test]
    fn expired_certificate_fails() {
        let tls = TlsSpec {
            cert_name: "cert".to_string(),
            require_client_cert: false,
        };
        let mut cert_expiry = HashMap::new();
        cert_expiry.insert("cert".to_string(), 900);

        let ctx = ValidationContext {
            cert_expiry,
            now: 1000,
            ..Default::default()
        };
        let errors = check(&listener(443, Some(tls)), &ctx);
        assert!(errors.iter().any(|e| e.message.contains("expired")));
    }

    #[test]
    fn unexpired_certificate_passes() {
        let tls = TlsSpec {
            cert_name: "cert".to_string(),
            require_client_cert: false,
        };
        let mut cert_expiry = HashMap::new();
        cert_expiry.insert("cert".to_string(), 2000);

        let ctx = ValidationContext {
            cert_expiry,
            now: 1000,
            ..Default::default()
        };
        assert!(check(&listener(443, Some(tls)), &ctx).is_empty());
    }
}
