//! Testing utilities: a scripted billing source and bill page builders.
//!
//! Useful for exercising the poller and scheduler without network access.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::{BillingSource, RawResponse};
use crate::types::{AccountId, GasResult};

/// Billing source that replays queued replies in order.
///
/// Once the queue is drained every query answers HTTP 200 with an empty
/// body. Every call is counted, including ones that return an error.
#[derive(Default)]
pub struct ScriptedSource {
    replies: Mutex<VecDeque<GasResult<RawResponse>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(replies: Vec<GasResult<RawResponse>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Queue another reply.
    pub fn push(&self, reply: GasResult<RawResponse>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Number of queries received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BillingSource for ScriptedSource {
    async fn fetch(&self, _account: &AccountId) -> GasResult<RawResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        next.unwrap_or_else(|| Ok(RawResponse::new(200, "")))
    }
}

/// Render a bill page with eleven header cells and eleven value cells.
///
/// Missing entries are padded with `colN` / `vN` placeholders.
pub fn bill_page(pairs: &[(&str, &str)]) -> String {
    let mut head = String::new();
    let mut body = String::new();
    for i in 0..11 {
        match pairs.get(i) {
            Some((label, value)) => {
                head.push_str(&format!("<th>{label}</th>"));
                body.push_str(&format!("<td>{value}</td>"));
            }
            None => {
                head.push_str(&format!("<th>col{i}</th>"));
                body.push_str(&format!("<td>v{i}</td>"));
            }
        }
    }
    format!(
        r#"<html><body><div class="table-responsive"><table>
        <thead><tr>{head}</tr></thead>
        <tbody><tr>{body}</tr></tbody>
        </table></div></body></html>"#
    )
}

/// A complete bill page with the usual labels.
pub fn sample_bill(amount: &str) -> String {
    bill_page(&[
        ("用戶編號", "12345678909"),
        ("收費日期", "2026/05/20"),
        ("累計度數", "3021"),
        ("本期總金額", amount),
        ("本期使用度數", "42"),
        ("繳費狀態", "未繳"),
    ])
}
