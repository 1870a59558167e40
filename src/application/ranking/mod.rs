mod ranker;
mod validator;

pub use ranker::{OpportunityRanker, OpportunityStatistics, RankedOpportunity};
pub use validator::OpportunityValidator;
