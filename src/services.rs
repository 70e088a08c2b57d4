//! Static port to service-name table used to label open ports.
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Label for ports missing from the table.
pub const UNKNOWN_SERVICE: &str = "-";

static SERVICES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (21, "FTP"),
        (22, "SSH"),
        (23, "Telnet"),
        (25, "SMTP"),
        (53, "DNS"),
        (80, "HTTP"),
        (110, "POP3"),
        (143, "IMAP"),
        (443, "HTTPS"),
        (445, "SMB"),
        (3306, "MySQL"),
        (3389, "RDP"),
        (5432, "PostgreSQL"),
        (5900, "VNC"),
        (6379, "Redis"),
        (8080, "HTTP-Alt"),
        (8443, "HTTPS-Alt"),
        (27017, "MongoDB"),
    ])
});

/// Well-known service name of `port`, or `None`.
pub fn lookup(port: u16) -> Option<&'static str> {
    SERVICES.get(&port).copied()
}

/// Service name of `port`, falling back to [`UNKNOWN_SERVICE`].
pub fn service_name(port: u16) -> &'static str {
    lookup(port).unwrap_or(UNKNOWN_SERVICE)
}
