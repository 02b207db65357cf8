#![no_main]

use libfuzzer_sys::fuzz_target;
use radix_room_client::protocol::ClientCommand;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Anything that decodes must encode again.
        if let Ok(command) = ClientCommand::from_frame(s) {
            let _ = command.to_frame();
        }
    }
});
