use std::fmt::Write;

use rand::RngCore;

/// Per-interaction trace context.
///
/// Every outbound request of an interaction carries the same `traceparent`
/// header (W3C trace context, version `00`, sampled), and every error raised by
/// the interaction is tagged with the trace id so that host logs and
/// counterparty logs can be correlated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    trace_id: [u8; 16],
    span_id: [u8; 8],
}

impl Default for Trace {
    fn default() -> Self {
        Self::new()
    }
}

impl Trace {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let mut trace_id = [0u8; 16];
        let mut span_id = [0u8; 8];
        rng.fill_bytes(&mut trace_id);
        rng.fill_bytes(&mut span_id);
        Self { trace_id, span_id }
    }

    /// The 32 character lowercase hex trace id.
    pub fn trace_id(&self) -> String {
        hex(&self.trace_id)
    }

    pub fn span_id(&self) -> String {
        hex(&self.span_id)
    }

    /// Value of the `traceparent` header.
    pub fn traceparent(&self) -> String {
        format!("00-{}-{}-01", self.trace_id(), self.span_id())
    }
}

pub(crate) const TRACEPARENT_HEADER: &str = "traceparent";

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traceparent_layout() {
        let trace = Trace::new();
        let header = trace.traceparent();
        let parts: Vec<&str> = header.split('-').collect();

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "00");
        assert_eq!(parts[1], trace.trace_id());
        assert_eq!(parts[1].len(), 32);
        assert_eq!(parts[2].len(), 16);
        assert_eq!(parts[3], "01");
    }

    #[test]
    fn ids_differ_between_interactions() {
        assert_ne!(Trace::new().trace_id(), Trace::new().trace_id());
    }
}
