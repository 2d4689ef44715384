//! Process and execution-mode vocabulary (C6), grounded on the original
//! `state.h`'s `LttvExecutionMode`/`LttvExecutionSubmode`/`LttvProcessStatus`/
//! `LttvProcessType`.
//!
//! The original represents these as dynamically-registered `GQuark`s so
//! third-party modules can name new modes at runtime. This engine has no
//! plugin system, so they become plain closed Rust enums; a submode's
//! free-form name (a syscall or trap name) is still just a string, since
//! the *set* of syscalls is genuinely open-ended.

use crate::domain::types::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionMode {
    #[default]
    Unknown,
    User,
    Syscall,
    Trap,
    Irq,
    SoftIrq,
}

impl ExecutionMode {
    /// Stable lowercase name, used both by attribute-tree paths (C8) and
    /// filter field comparisons (C7).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Unknown => "unknown",
            ExecutionMode::User => "user",
            ExecutionMode::Syscall => "syscall",
            ExecutionMode::Trap => "trap",
            ExecutionMode::Irq => "irq",
            ExecutionMode::SoftIrq => "softirq",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Submode {
    #[default]
    None,
    Named(String),
}

impl Submode {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Submode::None => "none",
            Submode::Named(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessStatus {
    #[default]
    Unnamed,
    WaitForkedProcess,
    WaitCpu,
    Exit,
    Zombie,
    Wait,
    Run,
    Dead,
}

impl ProcessStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStatus::Unnamed => "unnamed",
            ProcessStatus::WaitForkedProcess => "wait_forked_process",
            ProcessStatus::WaitCpu => "wait_cpu",
            ProcessStatus::Exit => "exit",
            ProcessStatus::Zombie => "zombie",
            ProcessStatus::Wait => "wait",
            ProcessStatus::Run => "run",
            ProcessStatus::Dead => "dead",
        }
    }

    /// Inverse of [`ProcessStatus::as_str`], used to parse a statedump
    /// enumeration event's `status` field back into a typed status.
    #[must_use]
    pub fn from_str(s: &str) -> Option<ProcessStatus> {
        Some(match s {
            "unnamed" => ProcessStatus::Unnamed,
            "wait_forked_process" => ProcessStatus::WaitForkedProcess,
            "wait_cpu" => ProcessStatus::WaitCpu,
            "exit" => ProcessStatus::Exit,
            "zombie" => ProcessStatus::Zombie,
            "wait" => ProcessStatus::Wait,
            "run" => ProcessStatus::Run,
            "dead" => ProcessStatus::Dead,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessType {
    UserThread,
    KernelThread,
}

impl ProcessType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessType::UserThread => "user_thread",
            ProcessType::KernelThread => "kernel_thread",
        }
    }

    /// Inverse of [`ProcessType::as_str`].
    #[must_use]
    pub fn from_str(s: &str) -> Option<ProcessType> {
        Some(match s {
            "user_thread" => ProcessType::UserThread,
            "kernel_thread" => ProcessType::KernelThread,
            _ => return None,
        })
    }
}

/// Identifies one row of the process table. `Pid(0)` is not a single
/// process: every CPU has its own idle task, so idle rows are keyed by CPU
/// instead (an idle row is eagerly created per CPU at trace open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessKey {
    Pid(Pid),
    Idle(crate::domain::types::Cpu),
}

impl ProcessKey {
    #[must_use]
    pub fn for_pid(pid: Pid, cpu: crate::domain::types::Cpu) -> ProcessKey {
        if pid.is_idle() {
            ProcessKey::Idle(cpu)
        } else {
            ProcessKey::Pid(pid)
        }
    }
}
