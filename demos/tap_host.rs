//! Run the stack on a TAP device
//!
//! Answers ARP and ping for the configured address and prints whatever
//! peers send to the listening TCP ports.
//!
//! ```sh
//! cargo run --example tap_host -- [config.toml]
//! ```
//!
//! Then, from the host side:
//!
//! ```sh
//! ping 10.1.0.1
//! nc 10.1.0.1 1337
//! ```
//!
//! Note: Root/sudo privileges are required to create and configure the TAP device.

use std::io::Read;
use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context};
use log::{info, warn};
use toy_tapstack::{NetworkInterface, StackConfig, TcpListener};
use tun_tap::{Iface, Mode};

const DEFAULT_PORT: u16 = 1337;
const HOST_SIDE_ADDR: &str = "10.1.0.254/24";

/// Give the kernel side of the TAP device an address and bring it up
fn configure_interface(name: &str) -> anyhow::Result<()> {
    let steps: [&[&str]; 2] = [
        &["addr", "add", HOST_SIDE_ADDR, "dev", name],
        &["link", "set", "up", "dev", name],
    ];
    for args in steps {
        let status = Command::new("ip").args(args).status().context("failed to run ip")?;
        if !status.success() {
            bail!("ip {} failed for {}", args.join(" "), name);
        }
    }
    Ok(())
}

fn serve(listener: TcpListener) {
    while let Some(mut stream) = listener.accept() {
        let key = stream.key();
        thread::spawn(move || {
            let mut received = Vec::new();
            match stream.read_to_end(&mut received) {
                Ok(_) => info!("{}: {:?}", key, String::from_utf8_lossy(&received)),
                Err(e) => warn!("{}: read failed: {}", key, e),
            }
        });
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => StackConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => StackConfig::default(),
    };

    let iface = Iface::without_packet_info("tap0", Mode::Tap).context("failed to create tap0")?;
    configure_interface(iface.name())?;
    info!("TAP device created: {}", iface.name());

    let mut stack = NetworkInterface::new(Arc::new(iface), &config)?;

    let ports = if config.listen.is_empty() {
        vec![DEFAULT_PORT]
    } else {
        config.listen.clone()
    };
    for port in ports {
        let listener = stack.listen(port)?;
        info!("listening on {}:{}", config.protocol_address, listener.port());
        thread::spawn(move || serve(listener));
    }

    let shutdown = AtomicBool::new(false);
    stack.run(&shutdown)?;
    Ok(())
}
