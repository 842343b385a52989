// SPDX-License-Identifier: GPL-3.0-only

//! Property selectors.
//!
//! Each selector fills one field of a candidate device from the first
//! configuration layer that sets it: the per-wwid entry, then the hardware
//! entry, then `[defaults]`, then the built-in value.

use multipath_types::{Failback, MultipathDevice, NoPathRetry, PathGroupingPolicy, RrWeight};
use tracing::debug;

use crate::context::ConfigContext;

pub const DEFAULT_SELECTOR: &str = "round-robin 0";
pub const DEFAULT_FEATURES: &str = "0";
pub const DEFAULT_HWHANDLER: &str = "0";
pub const DEFAULT_MINIO: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    CommandLine,
    Lun,
    Controller,
    ConfigDefault,
    Internal,
}

impl Origin {
    fn as_str(&self) -> &'static str {
        match self {
            Self::CommandLine => "(command line)",
            Self::Lun => "(LUN setting)",
            Self::Controller => "(controller setting)",
            Self::ConfigDefault => "(config file default)",
            Self::Internal => "(internal default)",
        }
    }
}

fn layered<T>(lun: Option<T>, controller: Option<T>, config: Option<T>, builtin: T) -> (T, Origin) {
    lun.map(|v| (v, Origin::Lun))
        .or_else(|| controller.map(|v| (v, Origin::Controller)))
        .or_else(|| config.map(|v| (v, Origin::ConfigDefault)))
        .unwrap_or((builtin, Origin::Internal))
}

pub fn select_pgfailback(ctx: &ConfigContext, mpp: &mut MultipathDevice) {
    let (value, origin) = layered(
        mpp.entry.as_ref().and_then(|e| e.failback),
        mpp.hw.as_ref().and_then(|h| h.failback),
        ctx.config().defaults.failback,
        Failback::Manual,
    );
    mpp.failback = value;
    debug!("{}: pgfailback = {:?} {}", mpp.alias, value, origin.as_str());
}

pub fn select_pgpolicy(ctx: &ConfigContext, mpp: &mut MultipathDevice) {
    let (value, origin) = match ctx.options().pg_policy {
        Some(policy) => (policy, Origin::CommandLine),
        None => layered(
            mpp.entry.as_ref().and_then(|e| e.path_grouping_policy),
            mpp.hw.as_ref().and_then(|h| h.path_grouping_policy),
            ctx.config().defaults.path_grouping_policy,
            PathGroupingPolicy::Failover,
        ),
    };
    mpp.pg_policy = value;
    debug!("{}: pgpolicy = {} {}", mpp.alias, value, origin.as_str());
}

pub fn select_selector(ctx: &ConfigContext, mpp: &mut MultipathDevice) {
    let (value, origin) = layered(
        mpp.entry.as_ref().and_then(|e| e.path_selector.clone()),
        mpp.hw.as_ref().and_then(|h| h.path_selector.clone()),
        ctx.config().defaults.path_selector.clone(),
        DEFAULT_SELECTOR.to_string(),
    );
    debug!("{}: selector = {} {}", mpp.alias, value, origin.as_str());
    mpp.selector = value;
}

pub fn select_features(ctx: &ConfigContext, mpp: &mut MultipathDevice) {
    let (value, origin) = layered(
        None,
        mpp.hw.as_ref().and_then(|h| h.features.clone()),
        ctx.config().defaults.features.clone(),
        DEFAULT_FEATURES.to_string(),
    );
    debug!("{}: features = {} {}", mpp.alias, value, origin.as_str());
    mpp.features = value;
}

pub fn select_hwhandler(ctx: &ConfigContext, mpp: &mut MultipathDevice) {
    let (value, origin) = layered(
        None,
        mpp.hw.as_ref().and_then(|h| h.hardware_handler.clone()),
        ctx.config().defaults.hardware_handler.clone(),
        DEFAULT_HWHANDLER.to_string(),
    );
    debug!("{}: hwhandler = {} {}", mpp.alias, value, origin.as_str());
    mpp.hwhandler = value;
}

pub fn select_rr_weight(ctx: &ConfigContext, mpp: &mut MultipathDevice) {
    let (value, origin) = layered(
        mpp.entry.as_ref().and_then(|e| e.rr_weight),
        mpp.hw.as_ref().and_then(|h| h.rr_weight),
        ctx.config().defaults.rr_weight,
        RrWeight::Uniform,
    );
    mpp.rr_weight = value;
    debug!("{}: rr_weight = {:?} {}", mpp.alias, value, origin.as_str());
}

pub fn select_minio(ctx: &ConfigContext, mpp: &mut MultipathDevice) {
    let (value, origin) = layered(
        mpp.entry.as_ref().and_then(|e| e.rr_min_io),
        mpp.hw.as_ref().and_then(|h| h.rr_min_io),
        ctx.config().defaults.rr_min_io,
        DEFAULT_MINIO,
    );
    mpp.minio = value;
    debug!("{}: minio = {} {}", mpp.alias, value, origin.as_str());
}

pub fn select_no_path_retry(ctx: &ConfigContext, mpp: &mut MultipathDevice) {
    let (value, origin) = layered(
        mpp.entry.as_ref().and_then(|e| e.no_path_retry),
        mpp.hw.as_ref().and_then(|h| h.no_path_retry),
        ctx.config().defaults.no_path_retry,
        NoPathRetry::Undef,
    );
    mpp.no_path_retry = value;
    if value.is_set() {
        debug!("{}: no_path_retry = {:?} {}", mpp.alias, value, origin.as_str());
    }
}

/// Pick the alias: configured name, then a user-friendly binding, then the
/// wwid itself.
pub fn select_alias(ctx: &ConfigContext, mpp: &mut MultipathDevice) {
    if let Some(alias) = mpp.entry.as_ref().and_then(|e| e.alias.clone()) {
        mpp.alias = alias;
        return;
    }

    let friendly = if ctx.config().defaults.user_friendly_names {
        ctx.aliases().resolve_alias(&mpp.wwid)
    } else {
        None
    };
    mpp.alias = friendly.unwrap_or_else(|| mpp.wwid.clone());
}

/// Run every policy selector on a candidate device.
pub fn select_all(ctx: &ConfigContext, mpp: &mut MultipathDevice) {
    select_pgfailback(ctx, mpp);
    select_pgpolicy(ctx, mpp);
    select_selector(ctx, mpp);
    select_features(ctx, mpp);
    select_hwhandler(ctx, mpp);
    select_rr_weight(ctx, mpp);
    select_minio(ctx, mpp);
    select_no_path_retry(ctx, mpp);
}
