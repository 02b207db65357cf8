#![no_main]

use libfuzzer_sys::fuzz_target;
use radix_room_client::protocol::ServerCommand;

fuzz_target!(|data: &[u8]| {
    // Raw bytes straight through serde_json, including its UTF-8 checks.
    let _ = serde_json::from_slice::<ServerCommand>(data);

    // The frame decoder the session loop uses.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = ServerCommand::from_frame(s);
    }
});
