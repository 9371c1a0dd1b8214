//! Global handle table: opaque ids to owned allocations.
//!
//! Ids are monotone and never reused, so a stale id simply misses the map —
//! there is no ABA window to defend against. The table entry holds one
//! strong reference; `adopt` takes further ones, and the allocation dies
//! when the table entry and every adopted reference are gone.

use core::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use once_cell::race::OnceBox;
use tether::Ptr;

use crate::buf::ByteBuf;

/// Id 0 is reserved as the failure value.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

static TABLE: OnceBox<DashMap<u64, Ptr<ByteBuf>>> = OnceBox::new();

fn table() -> &'static DashMap<u64, Ptr<ByteBuf>> {
    TABLE.get_or_init(|| Box::new(DashMap::new()))
}

/// Insert an owner and mint its id.
pub(crate) fn register(owner: Ptr<ByteBuf>) -> u64 {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    table().insert(id, owner);
    id
}

/// Clone the owning reference behind `id`, if the entry still exists.
pub(crate) fn adopt(id: u64) -> Option<Ptr<ByteBuf>> {
    table().get(&id).map(|entry| entry.value().clone())
}

/// Drop the table's owning reference. Stale or unknown ids are a safe no-op.
pub(crate) fn release(id: u64) -> bool {
    table().remove(&id).is_some()
}
