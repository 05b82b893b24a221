//! 核心编排层：错误与恢复、状态机、会话监管、可见性、主控循环

pub mod clock;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;
pub mod visibility;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{RecoveryAction, ResearchError};
pub use orchestrator::{
    build_workflow, create_client_from_config, create_store_from_config, create_workflow, spawn_workflow,
    Command, ResearchWorkflow,
};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use state::{ResearchEvent, ResearchState, WorkflowSnapshot};
pub use visibility::{Visibility, VisibilityAdvisory, VisibilityMonitor};
