use std::collections::HashMap;
use std::time::Duration;

use benor::{ClientRequest, Context};
use lrb::RbRequest;
use tokio::sync::{
    mpsc::{channel, Receiver, Sender},
    oneshot,
};
use tokio::time::timeout;

const NUM_NODES: usize = 3;
const NUM_FAULTS: usize = 1;

struct Group {
    client_sends: Vec<Sender<ClientRequest>>,
    decide_recvs: Vec<Receiver<(usize, i64)>>,
    _keepalive: Vec<(oneshot::Sender<()>, Sender<usize>)>,
}

/// Wires a group of consensus reactors over an in-memory broadcast fabric:
/// every payload a node hands down is delivered to every node, sender
/// included, the way the reliable broadcast layer would deliver it.
fn spawn_group() -> Group {
    let mut client_sends = Vec::new();
    let mut decide_recvs = Vec::new();
    let mut rb_req_recvs = Vec::new();
    let mut rb_out_sends = Vec::new();
    let mut keepalive = Vec::new();

    for id in 0..NUM_NODES {
        let (rb_req_send, rb_req_recv) = channel(1000);
        let (rb_out_send, rb_out_recv) = channel(1000);
        let (crash_send, crash_recv) = channel(10);
        let (client_send, client_recv) = channel(10);
        let (decide_send, decide_recv) = channel(100);
        let (exit_tx, exit_rx) = oneshot::channel();

        let mut context = Context::new(
            NUM_NODES,
            id,
            NUM_FAULTS,
            rb_req_send,
            rb_out_recv,
            crash_recv,
            client_recv,
            decide_send,
            exit_rx,
        );
        tokio::spawn(async move {
            let _ = context.run().await;
        });

        client_sends.push(client_send);
        decide_recvs.push(decide_recv);
        rb_req_recvs.push(rb_req_recv);
        rb_out_sends.push(rb_out_send);
        keepalive.push((exit_tx, crash_send));
    }

    for (origin, mut rb_req_recv) in rb_req_recvs.into_iter().enumerate() {
        let fanout = rb_out_sends.clone();
        tokio::spawn(async move {
            while let Some(req) = rb_req_recv.recv().await {
                if let RbRequest::Broadcast(payload) = req {
                    for out in &fanout {
                        let _ = out.send((origin, payload.clone())).await;
                    }
                }
            }
        });
    }

    Group {
        client_sends,
        decide_recvs,
        _keepalive: keepalive,
    }
}

async fn propose(group: &Group, node: usize, value: i64) -> oneshot::Receiver<i64> {
    let (resp_send, resp_recv) = oneshot::channel();
    group.client_sends[node]
        .send(ClientRequest::Propose(value, resp_send))
        .await
        .unwrap();
    resp_recv
}

#[tokio::test]
async fn single_proposal_decides_everywhere() {
    let mut group = spawn_group();

    let resp = propose(&group, 0, 10).await;
    let decided = timeout(Duration::from_secs(20), resp)
        .await
        .expect("no decision within the deadline")
        .unwrap();
    assert_eq!(decided, 10);

    // Every node, joiners included, reports the same decision for instance 1
    for decide_recv in group.decide_recvs.iter_mut() {
        let (instance, value) = timeout(Duration::from_secs(10), decide_recv.recv())
            .await
            .expect("no decision notification")
            .unwrap();
        assert_eq!((instance, value), (1, 10));
    }
}

#[tokio::test]
async fn concurrent_proposals_agree_per_instance() {
    let mut group = spawn_group();
    let proposals = [10, 20, 30];

    let mut responses = Vec::new();
    for (node, value) in proposals.iter().enumerate() {
        responses.push(propose(&group, node, *value).await);
    }

    // Validity: every proposer is answered with a value somebody proposed
    for resp in responses {
        let value = timeout(Duration::from_secs(30), resp)
            .await
            .expect("no decision within the deadline")
            .unwrap();
        assert!(proposals.contains(&value), "decided {} out of thin air", value);
    }

    // Agreement: wherever two nodes report the same instance, the value is
    // identical. Nodes may run different instance counts, so drain each
    // decision stream until it goes quiet.
    let mut per_node: Vec<HashMap<usize, i64>> = Vec::new();
    for decide_recv in group.decide_recvs.iter_mut() {
        let mut seen = HashMap::new();
        while let Ok(Some((instance, value))) =
            timeout(Duration::from_secs(2), decide_recv.recv()).await
        {
            let previous = seen.insert(instance, value);
            assert!(previous.is_none(), "instance {} decided twice", instance);
        }
        per_node.push(seen);
    }
    for a in 0..NUM_NODES {
        for b in (a + 1)..NUM_NODES {
            for (instance, value) in per_node[a].iter() {
                if let Some(other) = per_node[b].get(instance) {
                    assert_eq!(value, other, "nodes {} and {} split on instance {}", a, b, instance);
                }
            }
        }
    }
}
