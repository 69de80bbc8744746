//! Active-host rate tracking.
//!
//! A fixed-capacity, open-addressed table mapping source IPs to
//! sliding-window hit rates, used to throttle abusive senders without
//! unbounded memory. Slots are never individually freed; when the probe
//! window is full, the least-recently-touched slot in the window is
//! reclaimed and its history (including notes) is dropped with it.

use std::hash::BuildHasher;
use std::net::IpAddr;

/// Number of slots in the table.
pub const HOST_SLOTS: usize = 256;

/// Maximum linear-probe distance from the home slot.
pub const MAX_PROBE: usize = 16;

/// Number of interval counters per entry.
pub const RATE_TICKS: usize = 10;

/// Seconds covered by one interval counter.
pub const TICK_SECS: u32 = 6;

/// Seconds covered by the whole window.
pub const WINDOW_SECS: u32 = TICK_SECS * RATE_TICKS as u32;

/// Per-source-IP record.
#[derive(Debug, Clone)]
pub struct HostEntry {
    ip: IpAddr,
    touched: u32,
    max_rate: u32,
    counts: [u32; RATE_TICKS],
    // Tick number (unix time / TICK_SECS) that last wrote each counter;
    // counters from ticks outside the window are dead weight until reused.
    stamps: [u32; RATE_TICKS],
    notes: Vec<String>,
}

impl HostEntry {
    fn new(ip: IpAddr, now: u32, max_rate: u32) -> Self {
        HostEntry {
            ip,
            touched: now,
            max_rate,
            counts: [0; RATE_TICKS],
            stamps: [0; RATE_TICKS],
            notes: Vec::new(),
        }
    }

    /// The tracked source address.
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Unix time of the most recent activity.
    pub fn touched(&self) -> u32 {
        self.touched
    }

    /// The configured per-minute ceiling for this source.
    pub fn max_rate(&self) -> u32 {
        self.max_rate
    }

    /// Free-text annotations attached by callers.
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    fn update_rate(&mut self, now: u32) -> u32 {
        let tick = now / TICK_SECS;
        let slot = tick as usize % RATE_TICKS;
        if self.stamps[slot] != tick {
            self.stamps[slot] = tick;
            self.counts[slot] = 0;
        }
        self.counts[slot] += 1;
        self.touched = now;
        self.rate(now)
    }

    /// Requests per minute: the sum of every counter still inside the
    /// 60-second window ending at `now`.
    pub fn rate(&self, now: u32) -> u32 {
        let tick = now / TICK_SECS;
        let oldest = tick.saturating_sub(RATE_TICKS as u32 - 1);
        self.counts
            .iter()
            .zip(self.stamps.iter())
            .filter(|(_, &stamp)| stamp >= oldest && stamp <= tick)
            .map(|(&count, _)| count)
            .sum()
    }

    fn update_note(&mut self, find: Option<&str>, text: &str) {
        if let Some(needle) = find {
            for note in self.notes.iter_mut() {
                if note.contains(needle) {
                    *note = text.to_string();
                    return;
                }
            }
        }
        self.notes.push(text.to_string());
    }
}

/// Fixed-capacity open-addressed table of [`HostEntry`] records.
pub struct HostTable {
    slots: Vec<Option<HostEntry>>,
    hasher: ahash::RandomState,
    max_rate: u32,
}

impl HostTable {
    /// A fresh table. `max_rate` is stamped into each entry at creation.
    pub fn new(max_rate: u32) -> Self {
        HostTable {
            slots: vec![None; HOST_SLOTS],
            hasher: ahash::RandomState::new(),
            max_rate,
        }
    }

    fn home(&self, ip: &IpAddr) -> usize {
        self.hasher.hash_one(ip) as usize % HOST_SLOTS
    }

    /// Probe for an exact match within the probe window.
    pub fn find(&self, ip: IpAddr) -> Option<&HostEntry> {
        let home = self.home(&ip);
        for i in 0..MAX_PROBE {
            let slot = (home + i) % HOST_SLOTS;
            if let Some(ref entry) = self.slots[slot] {
                if entry.ip == ip {
                    return Some(entry);
                }
            }
        }
        None
    }

    /// Record one hit from `ip` at `now` and return its current rate.
    ///
    /// Probes for an existing entry, then for a free slot; with the window
    /// full, the least-recently-touched slot in the window is reclaimed for
    /// the new source. Under heavy hash collision pressure two sources can
    /// displace each other's history; the table stays bounded either way.
    pub fn update(&mut self, ip: IpAddr, now: u32) -> u32 {
        let home = self.home(&ip);

        for i in 0..MAX_PROBE {
            let slot = (home + i) % HOST_SLOTS;
            let matches = self.slots[slot]
                .as_ref()
                .map_or(false, |entry| entry.ip == ip);
            if matches {
                return self.slots[slot].as_mut().unwrap().update_rate(now);
            }
        }

        let mut free: Option<usize> = None;
        let mut coldest: usize = home;
        let mut coldest_touch = u32::MAX;
        for i in 0..MAX_PROBE {
            let slot = (home + i) % HOST_SLOTS;
            match self.slots[slot] {
                None => {
                    free = Some(slot);
                    break;
                }
                Some(ref entry) => {
                    if entry.touched < coldest_touch {
                        coldest_touch = entry.touched;
                        coldest = slot;
                    }
                }
            }
        }

        let slot = free.unwrap_or(coldest);
        let mut entry = HostEntry::new(ip, now, self.max_rate);
        let rate = entry.update_rate(now);
        self.slots[slot] = Some(entry);
        rate
    }

    /// Attach or update a note on `ip`'s entry, creating the entry if the
    /// source has not been seen. With `find` set, the first note containing
    /// it is replaced; otherwise (or with no match) the note is appended.
    pub fn update_note(&mut self, ip: IpAddr, now: u32, find: Option<&str>, text: &str) {
        if self.find(ip).is_none() {
            self.update(ip, now);
        }
        let home = self.home(&ip);
        for i in 0..MAX_PROBE {
            let slot = (home + i) % HOST_SLOTS;
            if let Some(ref mut entry) = self.slots[slot] {
                if entry.ip == ip {
                    entry.update_note(find, text);
                    return;
                }
            }
        }
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
