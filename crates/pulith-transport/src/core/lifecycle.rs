//! Legal transport callback sequences.
//!
//! | callback           | phase    | prior states                     | next state     |
//! |--------------------|----------|----------------------------------|----------------|
//! | part sent          | upload   | idle, uploading                  | uploading      |
//! | request sent       | upload   | idle, uploading                  | uploading      |
//! | head received      | upload   | idle, uploading                  | head-received  |
//! | head received      | download | head-received                    | head-received  |
//! | body part received | download | head-received, downloading       | downloading    |
//! | request finished   | download | head-received, downloading, end  | end            |
//! | request failed     | any      | any but end and failed           | failed         |
//!
//! A head always moves the request into the download phase.

use crate::data::{Callback, Phase, State};

/// Next `(state, phase)` after `callback`, or `None` if the callback is not
/// allowed in the current pair.
pub fn transition(state: State, phase: Phase, callback: Callback) -> Option<(State, Phase)> {
    use Phase::{Download, Upload};

    let next = match (callback, phase, state) {
        (Callback::PartSent | Callback::RequestSent, Upload, State::Idle | State::Uploading) => {
            (State::Uploading, Upload)
        }
        (Callback::HeadReceived, Upload, State::Idle | State::Uploading)
        | (Callback::HeadReceived, Download, State::HeadReceived) => (State::HeadReceived, Download),
        (Callback::BodyPartReceived, Download, State::HeadReceived | State::Downloading) => {
            (State::Downloading, Download)
        }
        (Callback::RequestFinished, Download, State::HeadReceived | State::Downloading | State::End) => {
            (State::End, Download)
        }
        (Callback::RequestFailed, phase, state) if !state.is_terminal() => (State::Failed, phase),
        _ => return None,
    };
    Some(next)
}
