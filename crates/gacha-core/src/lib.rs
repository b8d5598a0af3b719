//! Selection, queueing, playback, and configuration for the gacha overlay.
//!
//! A roll picks a [`RewardTier`](gacha_types::RewardTier) from a
//! [`WeightTable`], wraps it in a [`GachaEvent`](gacha_types::GachaEvent), and
//! pushes it onto a [`SharedQueue`]. The [`DisplayScheduler`] pops events one
//! at a time and drives each through the playback state machine against a
//! [`RenderSurface`].
//!
//! # Modules
//!
//! - [`selector`] -- Cumulative-weight sampling and [`WeightTable`].
//! - [`queue`] -- Two-stack FIFO [`EventQueue`] and the async [`SharedQueue`].
//! - [`playback`] -- Pure per-event playback state machine.
//! - [`scheduler`] -- [`DisplayScheduler`] and the [`RenderSurface`] trait.
//! - [`config`] -- Configuration loading from `gacha-config.yaml`.
//! - [`field_data`] -- Platform field data reshaped into tiers.
//! - [`command`] -- Chat command parsing.
//!
//! [`WeightTable`]: selector::WeightTable
//! [`EventQueue`]: queue::EventQueue
//! [`SharedQueue`]: queue::SharedQueue
//! [`DisplayScheduler`]: scheduler::DisplayScheduler
//! [`RenderSurface`]: scheduler::RenderSurface

pub mod command;
pub mod config;
pub mod field_data;
pub mod playback;
pub mod queue;
pub mod scheduler;
pub mod selector;
