//
// Copyright (c) The ospfd developers
//
// SPDX-License-Identifier: MIT
//

//
// Generic finite state machine support.
//
// Both protocol state machines are organized as static arrays of
// transitions. Each transition names a set of matching states (a bitmask),
// an event code, an action and an optional new state. The array is
// searched linearly and the first match wins. A transition without a new
// state leaves the decision to the action routine, which is how the DR
// election feeds its outcome back into the interface state machine.
//

// One FSM transition.
pub(crate) struct Transition<A, S> {
    // Bitmask of states this transition applies to.
    pub states: u16,
    // Event code to match.
    pub event: u8,
    // Action to run before the state is updated.
    pub action: A,
    // `None` leaves the new state to be computed by the action.
    pub new_state: Option<S>,
}

// Any state.
pub(crate) const ANY: u16 = u16::MAX;

// Searches a transition table. Returns the matching action and new state,
// or `None` when the event is unexpected in the current state.
pub(crate) fn run<A, S>(
    table: &'static [Transition<A, S>],
    state: u16,
    event: u8,
) -> Option<(A, Option<S>)>
where
    A: Copy,
    S: Copy,
{
    table
        .iter()
        .find(|tran| tran.states & state != 0 && tran.event == event)
        .map(|tran| (tran.action, tran.new_state))
}

// ===== tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_match_wins() {
        const TABLE: &[Transition<char, u8>] = &[
            Transition {
                states: 0b001,
                event: 1,
                action: 'a',
                new_state: Some(7),
            },
            Transition {
                states: ANY,
                event: 1,
                action: 'b',
                new_state: None,
            },
        ];

        assert_eq!(run(TABLE, 0b001, 1), Some(('a', Some(7))));
        assert_eq!(run(TABLE, 0b100, 1), Some(('b', None)));
        assert_eq!(run(TABLE, 0b001, 2), None);
    }
}
