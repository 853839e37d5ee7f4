use crate::actor::actor::{Actor, ActorContext, ActorRef};
use std::fmt::Debug;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error};

/// Spawns the actor's event loop on a Tokio task. The loop ends when every
/// `ActorRef` is dropped.
pub fn spawn_actor<M, A>(
    name: impl Into<String>,
    mailbox_capacity: usize,
    mut actor: A,
) -> (ActorRef<M>, JoinHandle<()>)
where
    A: Actor<M>,
    M: Send + Debug + 'static,
{
    let name = name.into();
    let ctx = ActorContext::new(name.clone());
    let (tx, mut rx) = mpsc::channel::<M>(mailbox_capacity.max(1));
    let actor_ref = ActorRef::new(name, tx);

    let handle = tokio::spawn(async move {
        if let Err(e) = actor.on_start(&ctx).await {
            error!(actor = %ctx.name(), error = %e, "Actor failed to start");
            return;
        }

        while let Some(msg) = rx.recv().await {
            if let Err(e) = actor.handle(msg, &ctx).await {
                error!(actor = %ctx.name(), error = %e, "Actor failed to handle message");
            }
        }

        if let Err(e) = actor.on_stop(&ctx).await {
            error!(actor = %ctx.name(), error = %e, "Actor failed to stop");
        }
        debug!(actor = %ctx.name(), "Actor stopped");
    });

    (actor_ref, handle)
}
