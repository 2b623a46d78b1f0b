/*!
 * Process Types
 * Lifecycle states, signal bits and entry descriptions
 */

use super::program::{Method, SnapshotBundle};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process lifecycle state, driven by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ProcessState {
    /// Not on any run list, waiting for mail
    Idle = 0,
    /// On the scheduler run list
    Scheduled = 1,
    /// Executing on a scheduler thread
    Running = 2,
    /// Suspended while idle
    SuspendedIdle = 3,
    /// Suspended while scheduled; becomes `Scheduled` on resume
    SuspendedScheduled = 4,
    /// Waiting for a garbage collection to complete
    SuspendedAwaitingGc = 5,
}

impl ProcessState {
    pub const ALL: [ProcessState; 6] = [
        ProcessState::Idle,
        ProcessState::Scheduled,
        ProcessState::Running,
        ProcessState::SuspendedIdle,
        ProcessState::SuspendedScheduled,
        ProcessState::SuspendedAwaitingGc,
    ];

    /// Stable printable name
    pub const fn name(&self) -> &'static str {
        match self {
            ProcessState::Idle => "IDLE",
            ProcessState::Scheduled => "SCHEDULED",
            ProcessState::Running => "RUNNING",
            ProcessState::SuspendedIdle => "SUSPENDED_IDLE",
            ProcessState::SuspendedScheduled => "SUSPENDED_SCHEDULED",
            ProcessState::SuspendedAwaitingGc => "SUSPENDED_AWAITING_GC",
        }
    }

    /// Suspended for scheduling purposes.
    ///
    /// `SuspendedAwaitingGc` is not included: it is resumed by GC
    /// completion, not by the plain suspend/resume path.
    #[inline(always)]
    pub const fn is_suspended(&self) -> bool {
        matches!(
            self,
            ProcessState::SuspendedIdle | ProcessState::SuspendedScheduled
        )
    }

    #[inline]
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ProcessState::Idle,
            1 => ProcessState::Scheduled,
            2 => ProcessState::Running,
            3 => ProcessState::SuspendedIdle,
            4 => ProcessState::SuspendedScheduled,
            _ => ProcessState::SuspendedAwaitingGc,
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Asynchronous process signal, polled by the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Signal {
    Kill = 1 << 0,
    PrintStackTrace = 1 << 1,
    Preempt = 1 << 2,
    Watchdog = 1 << 3,
}

impl Signal {
    #[inline]
    pub const fn bit(self) -> u32 {
        self as u32
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Signal::Kill => "KILL",
            Signal::PrintStackTrace => "PRINT_STACK_TRACE",
            Signal::Preempt => "PREEMPT",
            Signal::Watchdog => "WATCHDOG",
        }
    }
}

/// Snapshot of a process' pending signal bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalSet(u32);

impl SignalSet {
    pub const EMPTY: SignalSet = SignalSet(0);

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        SignalSet(bits)
    }

    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(&self, signal: Signal) -> bool {
        self.0 & signal.bit() != 0
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl From<Signal> for SignalSet {
    fn from(signal: Signal) -> Self {
        SignalSet(signal.bit())
    }
}

impl fmt::Display for SignalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            Signal::Kill,
            Signal::PrintStackTrace,
            Signal::Preempt,
            Signal::Watchdog,
        ]
        .iter()
        .filter(|s| self.contains(**s))
        .map(Signal::name)
        .collect();
        write!(f, "[{}]", names.join("|"))
    }
}

/// How a process starts executing
#[derive(Debug, Clone)]
pub enum ProcessEntry {
    /// The program's main entry point with command-line style arguments
    Main { args: Vec<String> },
    /// A separately loaded snapshot image with arguments
    Snapshot {
        bundle: SnapshotBundle,
        args: Vec<String>,
    },
    /// A compiled method with encoded argument bytes
    Spawn { method: Method, arguments: Vec<u8> },
}

/// Result of one run slice, reported to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Preempted or yielded with work left
    Yielded,
    /// Blocked on an empty mailbox
    Idle,
    /// Needs a garbage collection before it can continue
    AwaitingGc,
    /// Program completed or a fatal signal was observed
    Terminated(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_suspended_truth_table() {
        for state in ProcessState::ALL {
            let expected = matches!(
                state,
                ProcessState::SuspendedIdle | ProcessState::SuspendedScheduled
            );
            assert_eq!(state.is_suspended(), expected, "{}", state);
        }
        assert!(!ProcessState::SuspendedAwaitingGc.is_suspended());
    }

    #[test]
    fn test_state_u8_roundtrip() {
        for state in ProcessState::ALL {
            assert_eq!(ProcessState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_signal_set_display() {
        let set = SignalSet::from_bits(Signal::Kill.bit() | Signal::Watchdog.bit());
        assert_eq!(set.to_string(), "[KILL|WATCHDOG]");
        assert!(set.contains(Signal::Kill));
        assert!(!set.contains(Signal::Preempt));
    }
}
