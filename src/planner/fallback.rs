//! Deterministic stage table
//!
//! | Stage        | Always                              | On stage entry                          |
//! |--------------|-------------------------------------|-----------------------------------------|
//! | (no board)   | create_board p10, randomize p8      |                                         |
//! | Created      | request_randomization p8            |                                         |
//! | Randomized   | fetch_scores p7                     | numbers_assigned p5                     |
//! | Started      | fetch_scores p9                     | game_started p4                         |
//! | Ended        | settle_winner p10                   | winner_announced p6 (after settle)      |
//! | Settled      | payout_winner p9 while pending      |                                         |

use super::task::{PlanningContext, Priority, Task};
use crate::domain::GameLifecycleStage;
use crate::workers::{NotificationKind, WorkerCall};

fn notify(ctx: &PlanningContext, kind: NotificationKind, priority: u8) -> Task {
    Task::new(
        WorkerCall::SendNotification {
            kind,
            recipient: ctx.broadcast_recipient(),
            payload: ctx.notification_payload(),
        },
        Priority::of(priority),
    )
}

/// The fallback plan for a context; table order breaks priority ties
pub fn fallback_plan(ctx: &PlanningContext) -> Vec<Task> {
    let board = ctx.board_ref.clone();
    let entered = ctx.entered_stage();
    let mut tasks = Vec::new();

    match ctx.stage {
        None => {
            let create = Task::new(
                WorkerCall::CreateBoard {
                    game_id: ctx.game_id,
                },
                Priority::of(10),
            );
            let randomize = Task::new(
                WorkerCall::RequestRandomization { board },
                Priority::of(8),
            )
            .depends_on(create.id.clone());
            tasks.push(create);
            tasks.push(randomize);
        }
        Some(GameLifecycleStage::Created) => {
            tasks.push(Task::new(
                WorkerCall::RequestRandomization { board },
                Priority::of(8),
            ));
        }
        Some(GameLifecycleStage::Randomized) => {
            tasks.push(Task::new(
                WorkerCall::FetchScores {
                    game_id: ctx.game_id,
                },
                Priority::of(7),
            ));
            if entered {
                tasks.push(notify(ctx, NotificationKind::NumbersAssigned, 5));
            }
        }
        Some(GameLifecycleStage::Started) => {
            tasks.push(Task::new(
                WorkerCall::FetchScores {
                    game_id: ctx.game_id,
                },
                Priority::of(9),
            ));
            if entered {
                tasks.push(notify(ctx, NotificationKind::GameStarted, 4));
            }
        }
        Some(GameLifecycleStage::Ended) => {
            let settle = Task::new(WorkerCall::SettleWinner { board }, Priority::of(10));
            let settle_id = settle.id.clone();
            tasks.push(settle);
            if entered {
                tasks.push(notify(ctx, NotificationKind::WinnerAnnounced, 6).depends_on(settle_id));
            }
        }
        Some(GameLifecycleStage::Settled) => {
            if let (true, Some(winner)) = (ctx.payout_pending, ctx.winner.clone()) {
                tasks.push(Task::new(
                    WorkerCall::PayoutWinner { board, winner },
                    Priority::of(9),
                ));
            }
        }
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LedgerRecord;
    use crate::planner::validate::check_structure;

    fn ctx_for(stage: GameLifecycleStage, previous: Option<GameLifecycleStage>) -> PlanningContext {
        let mut record = LedgerRecord::empty(1);
        record.randomized = stage >= GameLifecycleStage::Randomized;
        record.started = stage >= GameLifecycleStage::Started;
        record.ended = stage >= GameLifecycleStage::Ended;
        if stage == GameLifecycleStage::Settled {
            record.winner = Some("carol".into());
            record.payout_amount = 1_000;
        }
        PlanningContext::from_record(&record, stage, previous)
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_created_requests_randomization() {
        let tasks = fallback_plan(&ctx_for(GameLifecycleStage::Created, None));
        assert_eq!(ids(&tasks), vec!["randomizer.request_randomization"]);
        assert_eq!(tasks[0].priority.get(), 8);
    }

    #[test]
    fn test_bootstrap_orders_create_before_randomize() {
        let tasks = fallback_plan(&PlanningContext::unbootstrapped(4));
        assert_eq!(
            ids(&tasks),
            vec!["board.create_board", "randomizer.request_randomization"]
        );
        assert!(tasks[1].dependencies.contains("board.create_board"));
    }

    #[test]
    fn test_entry_notifications_only_on_transition() {
        let entered = fallback_plan(&ctx_for(
            GameLifecycleStage::Started,
            Some(GameLifecycleStage::Randomized),
        ));
        assert_eq!(
            ids(&entered),
            vec!["oracle.fetch_scores", "notification.game_started"]
        );

        let steady = fallback_plan(&ctx_for(
            GameLifecycleStage::Started,
            Some(GameLifecycleStage::Started),
        ));
        assert_eq!(ids(&steady), vec!["oracle.fetch_scores"]);
    }

    #[test]
    fn test_announcement_waits_for_settlement() {
        let tasks = fallback_plan(&ctx_for(GameLifecycleStage::Ended, None));
        assert_eq!(tasks[0].id, "winner.settle_winner");
        assert!(tasks[1].dependencies.contains("winner.settle_winner"));
    }

    #[test]
    fn test_settled_pays_only_while_pending() {
        let pending = ctx_for(GameLifecycleStage::Settled, None);
        assert_eq!(ids(&fallback_plan(&pending)), vec!["winner.payout_winner"]);

        let mut paid = pending;
        paid.payout_pending = false;
        assert!(fallback_plan(&paid).is_empty());
    }

    #[test]
    fn test_every_table_entry_is_structurally_valid() {
        for stage in GameLifecycleStage::ALL {
            for previous in [None, Some(stage)] {
                check_structure(&fallback_plan(&ctx_for(stage, previous))).unwrap();
            }
        }
        check_structure(&fallback_plan(&PlanningContext::unbootstrapped(1))).unwrap();
    }
}
