//! Confirmation protocol for destructive moves
//!
//! Two move situations ask the user before mutating: crossing rule
//! systems (units get converted or dropped) and draining a source
//! force's last units (the source force gets deleted). The question
//! travels as a [`ConfirmPrompt`] over an mpsc channel; the answer
//! comes back over the prompt's oneshot. Dropping a prompt unanswered
//! counts as declining, so a dismissed dialog never leaves a move
//! half-applied.

use tokio::sync::{mpsc, oneshot};

/// Why a confirmation is being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmKind {
    /// Move crosses forces with different rule systems
    CrossSystemMove,
    /// Move drains the source force, which will be deleted
    DeleteSourceForce,
}

/// A pending question for the user
#[derive(Debug)]
pub struct ConfirmPrompt {
    /// What kind of destructive step is being confirmed
    pub kind: ConfirmKind,
    /// Human-readable question text
    pub message: String,
    reply: oneshot::Sender<bool>,
}

impl ConfirmPrompt {
    /// Answer yes
    pub fn accept(self) {
        let _ = self.reply.send(true);
    }

    /// Answer no
    pub fn decline(self) {
        let _ = self.reply.send(false);
    }

    /// Answer either way
    pub fn answer(self, accept: bool) {
        let _ = self.reply.send(accept);
    }
}

/// Engine-side handle for asking confirmations
#[derive(Debug, Clone)]
pub enum Confirmer {
    /// Route prompts to a receiver; an interactive frontend answers them
    Channel(mpsc::UnboundedSender<ConfirmPrompt>),
    /// Answer every prompt the same way (`--yes` flows, tests)
    Always(bool),
}

impl Confirmer {
    /// Confirmer that answers every prompt with `answer`
    pub fn always(answer: bool) -> Self {
        Confirmer::Always(answer)
    }

    /// Confirmer paired with the receiver a frontend drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ConfirmPrompt>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Confirmer::Channel(tx), rx)
    }

    /// Ask and await the answer.
    ///
    /// Declines when no frontend is listening or the prompt is dropped
    /// unanswered.
    pub async fn confirm(&self, kind: ConfirmKind, message: impl Into<String>) -> bool {
        match self {
            Confirmer::Always(answer) => *answer,
            Confirmer::Channel(tx) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                let prompt = ConfirmPrompt {
                    kind,
                    message: message.into(),
                    reply: reply_tx,
                };
                if tx.send(prompt).is_err() {
                    return false;
                }
                reply_rx.await.unwrap_or(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_always_answers_without_frontend() {
        assert!(
            Confirmer::always(true)
                .confirm(ConfirmKind::CrossSystemMove, "convert?")
                .await
        );
        assert!(
            !Confirmer::always(false)
                .confirm(ConfirmKind::DeleteSourceForce, "delete?")
                .await
        );
    }

    #[tokio::test]
    async fn test_channel_accept_and_decline() {
        let (confirmer, mut rx) = Confirmer::channel();

        let ask = confirmer.confirm(ConfirmKind::CrossSystemMove, "convert?");
        let frontend = async {
            let prompt = rx.recv().await.unwrap();
            assert_eq!(prompt.kind, ConfirmKind::CrossSystemMove);
            prompt.accept();
        };
        let (answer, _) = tokio::join!(ask, frontend);
        assert!(answer);

        let ask = confirmer.confirm(ConfirmKind::DeleteSourceForce, "delete?");
        let frontend = async {
            rx.recv().await.unwrap().decline();
        };
        let (answer, _) = tokio::join!(ask, frontend);
        assert!(!answer);
    }

    #[tokio::test]
    async fn test_dropped_prompt_declines() {
        let (confirmer, mut rx) = Confirmer::channel();

        let ask = confirmer.confirm(ConfirmKind::CrossSystemMove, "convert?");
        let frontend = async {
            // Dialog dismissed without answering
            drop(rx.recv().await.unwrap());
        };
        let (answer, _) = tokio::join!(ask, frontend);
        assert!(!answer);
    }

    #[tokio::test]
    async fn test_closed_channel_declines() {
        let (confirmer, rx) = Confirmer::channel();
        drop(rx);
        assert!(
            !confirmer
                .confirm(ConfirmKind::DeleteSourceForce, "delete?")
                .await
        );
    }
}
