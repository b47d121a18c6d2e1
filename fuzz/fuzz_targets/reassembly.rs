#![no_main]

use wpan::sixlowpan::{ReassemblyCache, Uncompressed};
use wpan::time::Instant;

use libfuzzer_sys::fuzz_target;

fuzz_target!(|fragments: Vec<(u16, Vec<u8>)>| {
    let mut cache = ReassemblyCache::<4>::new();
    let mut now = Instant::from_ms(0);

    for (elapsed, fragment) in fragments {
        now = Instant::from_ms(now.as_ms() + elapsed as i64);
        if let Ok(Some(datagram)) = cache.input(&fragment, now, &Uncompressed) {
            assert!(datagram.len() >= 40);
        }
        assert!(cache.len() <= 4);
    }
});
