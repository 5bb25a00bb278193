//! The video-call state machine living inside a P2P topic (spec.md §4.8).
//! Bound to the `seq` of the initiating `{pub head:mime=x-tinode-webrtc}`
//! message: every later `{note what=call}` on the same call carries that
//! same `seq`, which is also the seq the synthetic replacement is written
//! back to.
//!
//! No teacher file covers this; grounded directly on `original_source`'s
//! call handling, expressed in the topic actor's own event-handling idiom
//! (a plain state struct driven by one `drive` call per mailbox event,
//! mirroring how `handle_broadcast`/`handle_note` already dispatch).

use crate::error::{TopicError, TopicResult};
use chrono::{DateTime, Utc};
use wire_proto::client::CallEvent;
use wire_proto::uid::Uid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CallState {
    Inviting,
    Ringing,
    Accepted,
}

#[derive(Clone, Debug)]
pub struct VideoCall {
    caller: Uid,
    state: CallState,
    parties: Vec<Uid>,
    seq: i64,
    invited_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
}

impl VideoCall {
    pub fn seq(&self) -> i64 {
        self.seq
    }

    pub fn caller(&self) -> Uid {
        self.caller
    }

    pub fn involves(&self, uid: Uid) -> bool {
        self.parties.contains(&uid)
    }
}

/// What driving the state machine one step produced.
pub struct CallOutcome {
    /// `{data}` head replacement to persist at the call's `seq`, if any.
    pub replacement: Option<serde_json::Value>,
    /// `{info}` event name to relay, if any.
    pub notify: Option<&'static str>,
    /// Whether the originating session also receives the `{info}`.
    pub to_sender_too: bool,
    /// Whether `currentCall` should be cleared after this event.
    pub terminal: bool,
}

impl CallOutcome {
    fn relay(what: &'static str) -> Self {
        CallOutcome { replacement: None, notify: Some(what), to_sender_too: false, terminal: false }
    }
}

fn head(seq: i64, webrtc: &str) -> serde_json::Value {
    serde_json::json!({"replace": format!(":{seq}"), "webrtc": webrtc})
}

/// Advance the call bound to this topic by one `{note what=call}` event.
/// `current` is the topic's `currentCall` slot; on a terminal transition the
/// caller (topic actor) resets it to `None` once `terminal` comes back true.
pub fn drive(current: &mut Option<VideoCall>, from: Uid, event: CallEvent, seq: i64) -> TopicResult<CallOutcome> {
    match (current.as_mut(), event) {
        (None, CallEvent::Invite) => {
            *current = Some(VideoCall {
                caller: from,
                state: CallState::Inviting,
                parties: vec![from],
                seq,
                invited_at: Utc::now(),
                accepted_at: None,
            });
            Ok(CallOutcome::relay("invite"))
        }
        (None, _) => Err(TopicError::Malformed("call event with no call in progress".into())),
        (Some(_), CallEvent::Invite) => Err(TopicError::CallBusy),

        (Some(call), CallEvent::Ringing) if call.state == CallState::Inviting && from != call.caller => {
            call.state = CallState::Ringing;
            Ok(CallOutcome::relay("ringing"))
        }

        (Some(call), CallEvent::Accept) if matches!(call.state, CallState::Inviting | CallState::Ringing) && from != call.caller => {
            call.state = CallState::Accepted;
            call.accepted_at = Some(Utc::now());
            if !call.parties.contains(&from) {
                call.parties.push(from);
            }
            Ok(CallOutcome { replacement: Some(head(seq, "accepted")), notify: Some("accept"), to_sender_too: false, terminal: false })
        }

        (Some(call), CallEvent::Offer) if call.state == CallState::Accepted => {
            let _ = call;
            Ok(CallOutcome::relay("offer"))
        }
        (Some(call), CallEvent::Answer) if call.state == CallState::Accepted => {
            let _ = call;
            Ok(CallOutcome::relay("answer"))
        }
        (Some(_), CallEvent::IceCandidate) => Ok(CallOutcome::relay("ice-candidate")),

        (Some(call), CallEvent::HangUp) => {
            let webrtc = if call.state == CallState::Accepted && call.parties.len() == 2 {
                "finished"
            } else if from == call.caller {
                "missed"
            } else {
                "declined"
            };
            let mut h = head(seq, webrtc);
            if webrtc == "finished" {
                if let Some(accepted_at) = call.accepted_at {
                    let duration_ms = (Utc::now() - accepted_at).num_milliseconds().max(0);
                    h["durationMs"] = serde_json::json!(duration_ms);
                }
            }
            Ok(CallOutcome { replacement: Some(h), notify: Some("hang-up"), to_sender_too: true, terminal: true })
        }

        (Some(_), _) => Err(TopicError::Malformed("call event out of sequence".into())),
    }
}

/// Server-initiated termination, e.g. a party's session dropped mid-call.
/// Not reachable through a `{note}` event; called directly by the topic
/// actor's leave handling.
pub fn disconnect(current: &mut Option<VideoCall>, seq: i64) -> Option<CallOutcome> {
    if current.take().is_none() {
        return None;
    }
    Some(CallOutcome { replacement: Some(head(seq, "disconnected")), notify: Some("hang-up"), to_sender_too: true, terminal: true })
}

/// Fired when the call establishment timer elapses before the callee
/// accepts. A no-op once the call has reached `Accepted` — the timer only
/// guards the ringing phase.
pub fn timeout(current: &mut Option<VideoCall>) -> Option<CallOutcome> {
    let call = current.as_ref()?;
    if call.state == CallState::Accepted {
        return None;
    }
    let caller = call.caller;
    let seq = call.seq;
    drive(current, caller, CallEvent::HangUp, seq).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_then_accept_persists_accepted_head() {
        let mut call = None;
        let caller = Uid(1);
        let callee = Uid(2);
        drive(&mut call, caller, CallEvent::Invite, 10).unwrap();
        let outcome = drive(&mut call, callee, CallEvent::Accept, 10).unwrap();
        assert_eq!(outcome.replacement.unwrap()["webrtc"], "accepted");
        assert!(!outcome.terminal);
    }

    #[test]
    fn caller_hangup_before_accept_is_missed() {
        let mut call = None;
        let caller = Uid(1);
        drive(&mut call, caller, CallEvent::Invite, 10).unwrap();
        let outcome = drive(&mut call, caller, CallEvent::HangUp, 10).unwrap();
        assert_eq!(outcome.replacement.unwrap()["webrtc"], "missed");
        assert!(outcome.terminal);
    }

    #[test]
    fn callee_hangup_before_accept_is_declined() {
        let mut call = None;
        let caller = Uid(1);
        let callee = Uid(2);
        drive(&mut call, caller, CallEvent::Invite, 10).unwrap();
        let outcome = drive(&mut call, callee, CallEvent::HangUp, 10).unwrap();
        assert_eq!(outcome.replacement.unwrap()["webrtc"], "declined");
    }

    #[test]
    fn hangup_after_accept_is_finished_with_duration() {
        let mut call = None;
        let caller = Uid(1);
        let callee = Uid(2);
        drive(&mut call, caller, CallEvent::Invite, 10).unwrap();
        drive(&mut call, callee, CallEvent::Accept, 10).unwrap();
        let outcome = drive(&mut call, callee, CallEvent::HangUp, 10).unwrap();
        let head = outcome.replacement.unwrap();
        assert_eq!(head["webrtc"], "finished");
        assert!(head["durationMs"].is_number());
    }

    #[test]
    fn second_invite_while_call_in_progress_is_busy() {
        let mut call = None;
        drive(&mut call, Uid(1), CallEvent::Invite, 10).unwrap();
        let err = drive(&mut call, Uid(3), CallEvent::Invite, 11).unwrap_err();
        assert!(matches!(err, TopicError::CallBusy));
    }

    #[test]
    fn timeout_before_accept_yields_missed_and_is_terminal() {
        let mut call = None;
        drive(&mut call, Uid(1), CallEvent::Invite, 10).unwrap();
        let outcome = timeout(&mut call).unwrap();
        assert_eq!(outcome.replacement.unwrap()["webrtc"], "missed");
        assert!(outcome.terminal);
    }

    #[test]
    fn timeout_after_accept_is_a_no_op() {
        let mut call = None;
        let caller = Uid(1);
        let callee = Uid(2);
        drive(&mut call, caller, CallEvent::Invite, 10).unwrap();
        drive(&mut call, callee, CallEvent::Accept, 10).unwrap();
        assert!(timeout(&mut call).is_none());
    }

    #[test]
    fn timeout_with_no_call_in_progress_is_a_no_op() {
        let mut call = None;
        assert!(timeout(&mut call).is_none());
    }
}
