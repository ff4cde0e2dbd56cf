//! Integrity digest for simulation logs

use crate::amortization::SimulationResult;
use crate::session::SimulationLog;
use crate::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;

/// The part of a record the user saw; timestamps are left out so a replayed
/// session yields the same digest.
#[derive(Serialize)]
struct ShownSimulation<'a> {
    product_name: &'a str,
    amount: f64,
    term: u32,
    annual_interest_rate: f64,
    result: &'a SimulationResult,
}

/// SHA-256 over the simulations in log order, hex-encoded
pub fn simulation_log_digest(log: &SimulationLog) -> Result<String> {
    let mut hasher = Sha256::new();

    for record in log.iter() {
        let shown = ShownSimulation {
            product_name: &record.request.product_name,
            amount: record.request.amount,
            term: record.request.term,
            annual_interest_rate: record.annual_interest_rate,
            result: &record.result,
        };
        // Stream JSON directly into hasher (no intermediate String)
        serde_json::to_writer(&mut HashWriter(&mut hasher), &shown)?;
        hasher.update(b"\n");
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
