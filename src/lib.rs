// esf - deployment tooling for the serverless log forwarder
//
// The forwarder itself is the `bootstrap` binary in crates/esf-lambda; this
// crate renders and validates the SAM template that deploys it, and checks
// configuration before it is uploaded.

pub mod check;
pub mod deploy;
