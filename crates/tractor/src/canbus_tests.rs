// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::sleep;

use super::*;

async fn settle() {
    sleep(Duration::from_millis(30)).await;
}

#[tokio::test]
async fn virtual_pair_round_trips_frames() -> anyhow::Result<()> {
    let (a, b) = CanTransport::virtual_pair();
    a.send(0x123, &[1, 2, 3], 0)?;
    let (cob_id, data, recv_stamp) = b.recv().await?;
    assert_eq!(cob_id, 0x123);
    assert_eq!(&data[..], &[1, 2, 3]);
    assert!(recv_stamp.seconds > 0);
    Ok(())
}

#[tokio::test]
async fn try_recv_returns_none_when_idle() -> anyhow::Result<()> {
    let (a, b) = CanTransport::virtual_pair();
    assert!(b.try_recv()?.is_none());
    a.send(0x42, &[9], 0)?;
    assert!(b.try_recv()?.is_some());
    assert!(b.try_recv()?.is_none());
    Ok(())
}

#[tokio::test]
async fn readers_see_masked_ids_in_registration_order() -> anyhow::Result<()> {
    let (endpoint, peer) = CanTransport::virtual_pair();
    let can = CanBus::new(endpoint);

    let seen: Arc<Mutex<Vec<(u8, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    for tag in [0u8, 1u8] {
        let seen = Arc::clone(&seen);
        can.add_reader(move |cob_id, _data, _stamp| seen.lock().push((tag, cob_id)));
    }

    // Extended-frame flag bit must be masked off before fan-out.
    peer.send(0x0307, &[0, 0, 0, 0], CAN_EFF_FLAG)?;
    for _ in 0..100 {
        if !seen.lock().is_empty() {
            break;
        }
        settle().await;
    }

    let seen = seen.lock().clone();
    assert_eq!(seen, vec![(0, 0x0307), (1, 0x0307)]);
    Ok(())
}

#[tokio::test]
async fn bus_send_reaches_the_peer() -> anyhow::Result<()> {
    let (endpoint, peer) = CanTransport::virtual_pair();
    let can = CanBus::new(endpoint);
    can.send(0x10, &[0xAA, 0xBB], CAN_EFF_FLAG)?;
    let (cob_id, data, _) = peer.recv().await?;
    assert_eq!(cob_id & CAN_EFF_MASK, 0x10);
    assert_eq!(cob_id & CAN_EFF_FLAG, CAN_EFF_FLAG);
    assert_eq!(&data[..], &[0xAA, 0xBB]);
    Ok(())
}

#[tokio::test]
async fn peer_loss_disables_the_endpoint() -> anyhow::Result<()> {
    let (endpoint, peer) = CanTransport::virtual_pair();
    let can = CanBus::new(endpoint);
    let seen: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        can.add_reader(move |cob_id, _, _| seen.lock().push(cob_id));
    }
    peer.send(0x1, &[], 0)?;
    for _ in 0..100 {
        if !seen.lock().is_empty() {
            break;
        }
        settle().await;
    }
    drop(peer);
    settle().await;
    // The receive loop has exited; no further frames will ever arrive, and
    // sends now fail because the peer is gone.
    assert_eq!(seen.lock().clone(), vec![0x1]);
    assert!(can.send(0x2, &[], 0).is_err());
    Ok(())
}
