#![no_main]

use wpan_frame::{validate_frame, Command, Payload};

use libfuzzer_sys::{fuzz_target, Corpus};

fuzz_target!(|data: &[u8]| -> Corpus {
    if data.len() > 127 {
        return Corpus::Reject;
    }

    let Ok(mpdu) = validate_frame(data) else {
        return Corpus::Keep;
    };
    assert!(mpdu.header_len() <= data.len());

    match mpdu.payload() {
        Payload::Beacon(beacon) => {
            let _ = beacon.gts_slots().count();
            let _ = beacon.pending_addresses().count();
        }
        Payload::Command(command) => {
            let id = command.id();
            let body = &data[mpdu.header_len()..];
            assert_eq!(Command::parse(body).map(|c| c.id()), Ok(id));
        }
        _ => {}
    }

    Corpus::Keep
});
