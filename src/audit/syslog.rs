//! Syslog RFC 5424 export for audit events
//!
//! Sends each persisted event as a structured syslog message over UDP or
//! TCP. No syslog crate is used — RFC 5424 is simple enough to generate
//! directly. Best-effort: a send failure is logged and otherwise ignored,
//! since syslog export must never hold up persistence.

use std::net::SocketAddr;
use tokio::net::UdpSocket;

use super::event::AuditEvent;

#[derive(Debug, Clone)]
pub struct SyslogConfig {
    pub address: String,
    pub transport: SyslogTransport,
    pub facility: u8,
    pub app_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyslogTransport {
    Udp,
    Tcp,
}

#[derive(Clone)]
pub struct SyslogSender {
    address: SocketAddr,
    facility: u8,
    app_name: String,
    transport: SyslogTransport,
}

impl SyslogSender {
    pub fn new(config: &SyslogConfig) -> Result<Self, std::io::Error> {
        let address: SocketAddr = config
            .address
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        Ok(Self {
            address,
            facility: config.facility,
            app_name: config.app_name.clone(),
            transport: config.transport,
        })
    }

    pub async fn send(&self, event: &AuditEvent) -> Result<(), std::io::Error> {
        let message = self.format_rfc5424(event);

        match self.transport {
            SyslogTransport::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                socket.send_to(message.as_bytes(), self.address).await?;
            }
            SyslogTransport::Tcp => {
                use tokio::io::AsyncWriteExt;
                use tokio::net::TcpStream;

                let mut stream = TcpStream::connect(self.address).await?;
                let framed = format!("{message}\n");
                stream.write_all(framed.as_bytes()).await?;
            }
        }

        Ok(())
    }

    /// `<PRI>VERSION TIMESTAMP HOSTNAME APP-NAME PROCID MSGID [SD-ID SD-PARAM...] MSG`
    fn format_rfc5424(&self, event: &AuditEvent) -> String {
        const SEVERITY_INFO: u16 = 6;
        let pri = (self.facility as u16) * 8 + SEVERITY_INFO;
        let timestamp = event.timestamp.format("%Y-%m-%dT%H:%M:%S%.6fZ");
        let msgid = &event.subsystem;

        let mut sd_params = vec![
            format!("actor=\"{}\"", escape_sd_value(&event.actor.id)),
            format!("resource=\"{}:{}\"", event.resource.resource_type, escape_sd_value(&event.resource.identifier)),
            format!("seq=\"{}\"", event.sequence),
        ];
        if let Some(ref ip) = event.client_ip {
            sd_params.push(format!("src_ip=\"{}\"", escape_sd_value(ip)));
        }
        if let Some(ref request_id) = event.request_id {
            sd_params.push(format!("request_id=\"{}\"", escape_sd_value(request_id)));
        }
        if let Some(ref hash) = event.hash {
            sd_params.push(format!("hash=\"{hash}\""));
        }

        let structured_data = format!("[audit@49610 {}]", sd_params.join(" "));
        let msg = format!("{} seq={}", event.action, event.sequence);

        format!(
            "<{pri}>1 {timestamp} {} {} {msgid} {structured_data} {msg}",
            event.subsystem, self.app_name,
        )
    }
}

fn escape_sd_value(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace(']', "\\]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::{Principal, Resource};

    #[test]
    fn format_rfc5424_includes_action_and_sequence() {
        let sender = SyslogSender {
            address: "127.0.0.1:514".parse().unwrap(),
            facility: 13,
            app_name: "opsplane".to_string(),
            transport: SyslogTransport::Udp,
        };

        let mut event = AuditEvent::new(Principal::user("alice"), "task.trigger", Resource::new("task", "tsk_1"), "scheduler");
        event.sequence = 42;

        let message = sender.format_rfc5424(&event);
        assert!(message.starts_with("<110>1"));
        assert!(message.contains("task.trigger"));
        assert!(message.contains("seq=42"));
    }

    #[test]
    fn escape_sd_value_escapes_special_chars() {
        assert_eq!(escape_sd_value("he\"llo"), "he\\\"llo");
        assert_eq!(escape_sd_value("he]llo"), "he\\]llo");
    }
}
