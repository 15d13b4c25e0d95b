//! Authentication results and transport summary for the Security tab.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthVerdict {
    Pass,
    Fail,
    SoftFail,
    Neutral,
    #[default]
    None,
    TempError,
    PermError,
}

impl AuthVerdict {
    pub fn from_symbol(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "pass" => AuthVerdict::Pass,
            "fail" | "hardfail" => AuthVerdict::Fail,
            "softfail" => AuthVerdict::SoftFail,
            "neutral" => AuthVerdict::Neutral,
            "temperror" => AuthVerdict::TempError,
            "permerror" => AuthVerdict::PermError,
            _ => AuthVerdict::None,
        }
    }

    fn points(self) -> u8 {
        match self {
            AuthVerdict::Pass => 30,
            AuthVerdict::SoftFail | AuthVerdict::Neutral => 10,
            _ => 0,
        }
    }
}

impl fmt::Display for AuthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthVerdict::Pass => "pass",
            AuthVerdict::Fail => "fail",
            AuthVerdict::SoftFail => "softfail",
            AuthVerdict::Neutral => "neutral",
            AuthVerdict::None => "none",
            AuthVerdict::TempError => "temperror",
            AuthVerdict::PermError => "permerror",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthResults {
    pub spf: AuthVerdict,
    pub dkim: AuthVerdict,
    pub dmarc: AuthVerdict,
}

impl AuthResults {
    /// Collect verdicts from every `Authentication-Results` header.
    /// The first verdict seen for a mechanism wins.
    pub fn from_headers(headers: &[(String, String)]) -> Self {
        let mut spf = None;
        let mut dkim = None;
        let mut dmarc = None;
        for (name, value) in headers {
            if !name.eq_ignore_ascii_case("Authentication-Results") {
                continue;
            }
            for clause in value.split(';') {
                let Some((key, rest)) = clause.trim().split_once('=') else {
                    continue;
                };
                let verdict: String = rest
                    .chars()
                    .take_while(|c| c.is_ascii_alphabetic())
                    .collect();
                let slot = match key.trim().to_ascii_lowercase().as_str() {
                    "spf" => &mut spf,
                    "dkim" => &mut dkim,
                    "dmarc" => &mut dmarc,
                    _ => continue,
                };
                if slot.is_none() {
                    *slot = Some(AuthVerdict::from_symbol(&verdict));
                }
            }
        }
        Self {
            spf: spf.unwrap_or_default(),
            dkim: dkim.unwrap_or_default(),
            dmarc: dmarc.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportSummary {
    pub hops: usize,
    /// Every hop that names its protocol used an encrypted one.
    pub tls: bool,
    /// `from` host of the earliest hop.
    pub first_relay: Option<String>,
}

fn protocol_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bwith\s+([A-Za-z0-9]+)").ok())
        .as_ref()
}

fn from_host_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*from\s+([^\s;()]+)").ok())
        .as_ref()
}

const SECURE_PROTOCOLS: &[&str] = &["ESMTPS", "ESMTPSA", "UTF8SMTPS", "UTF8SMTPSA", "LMTPS"];

impl TransportSummary {
    pub fn from_headers(headers: &[(String, String)]) -> Self {
        let received: Vec<&str> = headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("Received"))
            .map(|(_, value)| value.as_str())
            .collect();

        let mut named = 0;
        let mut secure = 0;
        for hop in &received {
            if let Some(caps) = protocol_re().and_then(|re| re.captures(hop)) {
                named += 1;
                let proto = caps[1].to_ascii_uppercase();
                if SECURE_PROTOCOLS.contains(&proto.as_str())
                    || hop.to_ascii_uppercase().contains("TLS")
                {
                    secure += 1;
                }
            }
        }

        // Received headers are prepended by each relay, so the earliest is last.
        let first_relay = received
            .last()
            .and_then(|hop| from_host_re().and_then(|re| re.captures(hop)))
            .map(|caps| caps[1].to_string());

        Self {
            hops: received.len(),
            tls: named > 0 && named == secure,
            first_relay,
        }
    }
}

/// Score out of 100 derived from the authentication verdicts and transport.
pub fn score(auth: &AuthResults, transport: &TransportSummary) -> u8 {
    let mut total = auth.spf.points() + auth.dkim.points() + auth.dmarc.points();
    if transport.tls {
        total += 10;
    }
    total.min(100)
}
