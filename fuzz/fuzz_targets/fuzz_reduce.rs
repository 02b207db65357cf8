#![no_main]

use libfuzzer_sys::fuzz_target;
use radix_room_client::protocol::ServerCommand;
use radix_room_client::RoomState;

fuzz_target!(|data: &[u8]| {
    // One frame per line, folded through the reducer.
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let state = text
        .lines()
        .filter_map(|line| ServerCommand::from_frame(line).ok())
        .fold(RoomState::new(), RoomState::reduce);

    if let Some(problems) = state.problems() {
        assert!(state.current_problem_index() < problems.len().max(1));
        assert!(state
            .code()
            .iter()
            .all(|(key, _)| key.problem_index < problems.len()));
    }
});
