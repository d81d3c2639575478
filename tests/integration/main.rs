mod ledger;
mod lifecycle;
mod payments;
mod support;
