use std::collections::HashMap;
use std::env;
use std::fmt::Write;
use std::path::PathBuf;

const PREFIX: &str = "WPAN_";

fn main() {
    // (Variable, Type, Default value)
    let mut configs: HashMap<&str, (&str, &str)> = HashMap::from([
        ("MAC_MIN_BE", ("u8", "3")),
        ("MAC_MAX_BE", ("u8", "5")),
        ("MAC_MAX_CSMA_BACKOFFS", ("u8", "4")),
        ("MAC_MAX_FRAME_RETRIES", ("u8", "3")),
        (
            "MAC_UNIT_BACKOFF_DURATION",
            (
                "Duration",
                "Duration::from_us((UNIT_BACKOFF_PERIOD * SYMBOL_RATE_INV_US) as i64)",
            ),
        ),
        ("MAC_ACK_WAIT_DURATION", ("Duration", "Duration::from_us(2_000)")),
        (
            "MAC_RESPONSE_WAIT_TIME",
            ("Duration", "Duration::from_us(491_520)"),
        ),
        ("MAC_AIFS_PERIOD", ("Duration", "Duration::from_us(1000)")),
        ("MAC_SIFS_PERIOD", ("Duration", "Duration::from_us(1000)")),
        ("MAC_PAN_ID", ("u16", "0xffff")),
        ("MAC_ACK_REPLY", ("bool", "true")),
        ("REASS_CACHE_SIZE", ("usize", "4")),
        (
            "FRAG_REASSEMBLY_TIMEOUT",
            ("Duration", "Duration::from_ms(5_000)"),
        ),
        ("NET_TCP_RETRY_COUNT", ("u8", "9")),
        ("NET_TCP_INIT_RTO", ("Duration", "Duration::from_ms(200)")),
        (
            "NET_TCP_TIME_WAIT_DELAY",
            ("Duration", "Duration::from_ms(1_500)"),
        ),
        ("NET_TCP_ACK_TIMEOUT", ("Duration", "Duration::from_ms(1_000)")),
        ("NET_TCP_FIN_TIMEOUT", ("Duration", "Duration::from_ms(2_000)")),
        (
            "NET_TCP_CONNECT_TIMEOUT",
            ("Duration", "Duration::from_ms(3_000)"),
        ),
        ("NET_TCP_MSS", ("u16", "1220")),
    ]);

    // Make sure we get rerun if needed
    println!("cargo:rerun-if-changed=build.rs");
    for name in configs.keys() {
        println!("cargo:rerun-if-env-changed={PREFIX}{name}");
    }

    let mut data = String::new();
    writeln!(data, "use crate::time::Duration;").unwrap();
    writeln!(data, "use crate::mac::constants::UNIT_BACKOFF_PERIOD;").unwrap();
    writeln!(data, "use crate::phy::constants::SYMBOL_RATE_INV_US;").unwrap();

    for (var, value) in env::vars() {
        if let Some(name) = var.strip_prefix(PREFIX) {
            // Consume the setting, so the default is not written as well
            let Some((_, (ty, _))) = configs.remove_entry(name) else {
                panic!("Wrong configuration name {name}");
            };

            writeln!(data, "pub const {name}: {ty} = {value};").unwrap();
        }
    }

    for (name, (ty, value)) in configs.iter() {
        writeln!(data, "pub const {name}: {ty} = {value};").unwrap();
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    std::fs::write(out_dir.join("config.rs"), data).unwrap();
}
