// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

// One Device driven from several threads at once.  Each feature block is
// serialized by its own semaphore, so interleaved multi-register operations
// must never corrupt each other.

use std::sync::Arc;
use std::thread;

use msd::atu::{self, AtuEntry, EntryState, MacAddr};
use msd::policy::{self, Action, FrameKey};
use msd::ptp::{self, TimeArray};
use msd::sim::SimSwitch;
use msd::{Bsp, Device, Family, SysConfig};

fn load(family: Family) -> Arc<Device> {
    let sim = SimSwitch::new(family);
    Arc::new(Device::load(SysConfig::default(), Bsp::smi(sim)).unwrap())
}

#[test]
fn atu_loads_from_many_threads() {
    let dev = load(Family::Peridot);
    let handles: Vec<_> = (1..=4u16)
        .map(|fid| {
            let dev = Arc::clone(&dev);
            thread::spawn(move || {
                for i in 0..32u8 {
                    let e = AtuEntry {
                        mac: MacAddr([0x00, 0x10, 0x18, fid as u8, 0x00, i]),
                        fid,
                        port_vec: 1 << (i % 11),
                        trunk: false,
                        state: EntryState::UC_STATIC,
                        priority: fid as u8,
                    };
                    atu::load_entry(&dev, &e).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for fid in 1..=4u16 {
        let entries = atu::entries(&dev, fid).unwrap();
        assert_eq!(entries.len(), 32);
        assert!(
            entries
                .iter()
                .all(|e| e.fid == fid && e.priority == fid as u8)
        );
        assert!(entries.iter().all(|e| e.mac.0[3] == fid as u8));
    }
}

#[test]
fn features_interleave() {
    let dev = load(Family::Fir);

    let ptp_dev = Arc::clone(&dev);
    let ptp = thread::spawn(move || {
        for round in 0..16u32 {
            let index = (round % 4) as u8;
            let ta = TimeArray {
                load_point: round,
                tod_nanos: round * 1000,
                tod_secs: round as u64 + 1_700_000_000,
                compensation: round,
                domain: index,
                clock_valid: true,
                ..Default::default()
            };
            ptp::store_all(&ptp_dev, index, &ta).unwrap();
            assert_eq!(ptp::capture_all(&ptp_dev, index).unwrap(), ta);
        }
    });

    let policy_dev = Arc::clone(&dev);
    let policy = thread::spawn(move || {
        for port in 0..policy_dev.num_ports() {
            for key in FrameKey::ALL {
                policy::set_frame_action(&policy_dev, port, key, Action::Trap)
                    .unwrap();
            }
            policy::set_cpu_dest(&policy_dev, Some(port)).unwrap();
        }
    });

    let atu_dev = Arc::clone(&dev);
    let atu = thread::spawn(move || {
        for i in 0..64u8 {
            let e = AtuEntry {
                mac: MacAddr([0x02, 0, 0, 0, 1, i]),
                fid: 7,
                port_vec: 0b11,
                trunk: false,
                state: EntryState::UC_STATIC,
                priority: 0,
            };
            atu::load_entry(&atu_dev, &e).unwrap();
        }
        atu::count_entries(&atu_dev, 7).unwrap()
    });

    ptp.join().unwrap();
    policy.join().unwrap();
    assert_eq!(atu.join().unwrap(), 64);

    for port in 0..dev.num_ports() {
        for key in FrameKey::ALL {
            let action = policy::get_frame_action(&dev, port, key).unwrap();
            assert_eq!(action, Action::Trap);
        }
    }
    assert_eq!(policy::get_cpu_dest(&dev).unwrap(), Some(dev.num_ports() - 1));
}
