//! Kiosk runtime binary
//!
//! Runs the full session against the configured station and drives the
//! logging presentation consumer. Intended to run unattended: the session
//! self-heals from any transport interruption, so this process only exits
//! when the event loop itself is torn down.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    weighlink::main()
}
