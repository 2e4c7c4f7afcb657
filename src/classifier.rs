use tracing::debug;

use crate::models::{FlowBasis, FlowType, Transaction};
use crate::patterns::{PatternTable, PriorityTier};

/// Assigns each transaction exactly one flow type. Total: every input gets an
/// answer, the last two steps only look at the sign.
pub struct FlowClassifier<'a> {
    table: &'a PatternTable,
}

impl<'a> FlowClassifier<'a> {
    pub fn new(table: &'a PatternTable) -> Self {
        Self { table }
    }

    /// The flow type of `txn`, together with the step that decided it.
    pub fn classify(&self, txn: &Transaction) -> (FlowType, FlowBasis) {
        if txn.amount.is_zero() {
            return (FlowType::Excluded, FlowBasis::ZeroAmount);
        }

        let upper = txn.description.to_uppercase();

        if let Some(flow) = self
            .table
            .custom_rules()
            .iter()
            .find_map(|r| r.flow_type.filter(|_| r.is_match(&upper)))
        {
            return (flow, FlowBasis::CustomRule);
        }

        // EXCLUDED is checked before INTERNAL_TRANSFER no matter where either
        // tier's rules sit in the table.
        let tiers = [
            (FlowType::Excluded, FlowBasis::ExcludedPattern),
            (FlowType::InternalTransfer, FlowBasis::TransferPattern),
        ];
        for (flow, basis) in tiers {
            if self
                .table
                .tier(PriorityTier::Flow(flow))
                .any(|r| r.is_match(&upper))
            {
                return (flow, basis);
            }
        }

        if txn.amount.is_sign_positive() {
            (FlowType::Income, FlowBasis::PositiveAmount)
        } else {
            (FlowType::Expense, FlowBasis::NegativeAmount)
        }
    }

    /// Classify every unclassified transaction in place.
    pub fn classify_all(&self, txns: &mut [Transaction]) {
        for txn in txns.iter_mut().filter(|t| t.flow_type.is_none()) {
            let (flow, basis) = self.classify(txn);
            debug!(row = txn.source_row_id, %flow, %basis, "classified");
            txn.assign_flow(flow, basis);
        }
    }
}
