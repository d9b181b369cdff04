//! Queue family resolution and the device queue plan.

use crate::capabilities::QueueFamilyInfo;
use crate::error::{GpuError, Result};
use ash::vk;
use std::collections::BTreeMap;

/// Family index chosen for each queue role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub compute: u32,
    pub transfer: u32,
    pub present: u32,
}

/// Resolve queue roles in a single pass over the families.
///
/// Graphics takes the first graphics-capable family, which is also the present
/// family when it can present. Compute takes the first compute family other
/// than graphics, transfer the first transfer family other than compute. A
/// role left unassigned shares the graphics family. A present queue outside
/// the graphics family is not supported.
pub fn resolve_queue_families(families: &[QueueFamilyInfo]) -> Result<QueueFamilies> {
    let mut graphics = None;
    let mut compute = None;
    let mut transfer = None;
    let mut present = None;

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;

        if graphics.is_none() && family.flags.contains(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
            if family.present {
                present = Some(index);
            }
        }

        if compute.is_none()
            && family.flags.contains(vk::QueueFlags::COMPUTE)
            && graphics != Some(index)
        {
            compute = Some(index);
        }

        if transfer.is_none()
            && family.flags.contains(vk::QueueFlags::TRANSFER)
            && compute != Some(index)
        {
            transfer = Some(index);
        }

        if graphics.is_some() && compute.is_some() && transfer.is_some() && present.is_some() {
            break;
        }
    }

    let graphics = graphics.ok_or(GpuError::NoSuitableDevice)?;
    let present = present.ok_or(GpuError::SeparatePresentQueue)?;

    Ok(QueueFamilies {
        graphics,
        compute: compute.unwrap_or(graphics),
        transfer: transfer.unwrap_or(graphics),
        present,
    })
}

/// Queues to request from one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRequest {
    pub family: u32,
    pub count: u32,
}

/// (family, queue index) pair a role's queue is fetched from.
pub type QueueSlot = (u32, u32);

/// Queue creation plan derived from [`QueueFamilies`].
///
/// Roles collapsing onto the graphics family ask that family for more queues
/// instead of adding a second entry for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePlan {
    pub requests: Vec<QueueRequest>,
    pub graphics: QueueSlot,
    pub compute: QueueSlot,
    pub transfer: QueueSlot,
    pub present: QueueSlot,
    /// Distinct families in use, ascending.
    pub unique_families: Vec<u32>,
}

impl QueuePlan {
    /// Queue requests for `resolved`, clamped to the queue counts in `families`.
    pub fn new(resolved: QueueFamilies, families: &[QueueFamilyInfo]) -> Self {
        let QueueFamilies {
            graphics,
            compute,
            transfer,
            present,
        } = resolved;

        let available = |family: u32| {
            families
                .get(family as usize)
                .map_or(1, |f| f.queue_count.max(1))
        };

        let mut wanted: BTreeMap<u32, u32> = BTreeMap::new();
        *wanted.entry(graphics).or_default() += 1;
        if compute != graphics {
            *wanted.entry(compute).or_default() += 1;
        }
        let transfer_slot = if transfer == graphics {
            *wanted.entry(graphics).or_default() += 1;
            wanted[&graphics] - 1
        } else {
            wanted.entry(transfer).or_insert(1);
            0
        };
        let present_slot = if present == graphics {
            *wanted.entry(graphics).or_default() += 1;
            wanted[&graphics] - 1
        } else {
            wanted.entry(present).or_insert(1);
            0
        };

        let requests: Vec<QueueRequest> = wanted
            .iter()
            .map(|(&family, &count)| QueueRequest {
                family,
                count: count.min(available(family)),
            })
            .collect();

        let clamp = |family: u32, slot: u32| -> QueueSlot {
            let granted = requests
                .iter()
                .find(|r| r.family == family)
                .map_or(1, |r| r.count);
            (family, slot.min(granted - 1))
        };

        Self {
            graphics: (graphics, 0),
            compute: (compute, 0),
            transfer: clamp(transfer, transfer_slot),
            present: clamp(present, present_slot),
            unique_families: wanted.keys().copied().collect(),
            requests,
        }
    }

    /// Total number of queues requested.
    pub fn queue_count(&self) -> u32 {
        self.requests.iter().map(|r| r.count).sum()
    }
}
