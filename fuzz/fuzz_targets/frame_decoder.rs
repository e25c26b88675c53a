#![no_main]

use libfuzzer_sys::fuzz_target;
use lockgraph::config::{Charset, DecoderConfig, LockgraphConfig};
use lockgraph::session::Session;

fuzz_target!(|data: &[u8]| {
    // First byte picks the wire mode, the rest is one buffer
    let Some((&mode, buffer)) = data.split_first() else {
        return;
    };
    let config = LockgraphConfig {
        decoder: DecoderConfig {
            two_timestamps: mode & 1 != 0,
            charset: if mode & 2 != 0 { Charset::Latin1 } else { Charset::Utf8 },
        },
        ..LockgraphConfig::default()
    };

    // Decoding arbitrary bytes must never panic, and a desynced session
    // must still snapshot and recover through reset
    let session = Session::new(&config);
    for chunk in buffer.chunks(64) {
        let _ = session.process_buffer(chunk);
    }
    let root = session.root_node();
    let _ = root.time();
    for child in root.children() {
        let _ = child.children().len();
    }
    if session.is_poisoned() {
        assert!(session.reset());
    }
});
