use tokio::time::sleep;

use crate::{
    services::{round_service, settlement_service, websocket_service},
    state::{
        SharedState,
        lobby::Lobby,
        outbox::{Envelope, Outbox},
    },
};

/// Run `handler` under the lobby lock and carry out the effects it produced.
///
/// Messages are queued on the participants' writers before the lock is released so two handlers
/// can never interleave their broadcasts. Timers and settlements are spawned.
pub async fn apply(state: &SharedState, handler: impl FnOnce(&mut Lobby) -> Outbox) {
    let mut lobby = state.lobby().lock().await;
    let outbox = handler(&mut lobby);
    deliver(state, outbox);
}

fn deliver(state: &SharedState, outbox: Outbox) {
    for Envelope { to, message } in outbox.messages {
        websocket_service::send_to_participant(state, &to, &message);
    }

    for timer in outbox.timers {
        let state = state.clone();
        tokio::spawn(async move {
            sleep(timer.delay).await;
            round_service::fire(&state, timer).await;
        });
    }

    for order in outbox.settlements {
        tokio::spawn(settlement_service::settle(state.clone(), order));
    }
}
