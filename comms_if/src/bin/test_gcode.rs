//! Simple G-code client test
//!
//! Sends a single line of G-code to the machine and prints the reply.

use comms_if::net::{HttpLink, MachineLink, SimLink};
use std::time::Duration;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "test_gcode", about = "Send one line of G-code to the machine")]
struct Opt {
    /// Address of the machine, for example `192.168.1.2`
    #[structopt(short, long, default_value = "127.0.0.1")]
    address: String,

    /// Request timeout in milliseconds
    #[structopt(short, long)]
    timeout_ms: Option<u64>,

    /// Send to the built-in simulator instead of a machine
    #[structopt(long)]
    simulated: bool,

    /// The G-code to send, for example `M114`
    #[structopt(required = true)]
    code: Vec<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    let mut link: Box<dyn MachineLink> = if opt.simulated {
        Box::new(SimLink::new())
    } else {
        Box::new(HttpLink::new(&opt.address)?)
    };

    let code = opt.code.join(" ");
    let timeout = opt.timeout_ms.map(Duration::from_millis);

    println!("Sending {:?} to {}", code, link.address());

    match link.send_gcode(&code, timeout) {
        Ok(reply) => {
            println!("{}", reply);
            Ok(())
        }
        Err(e) => {
            println!("Could not send: {}", e);
            Err(e.into())
        }
    }
}
