pub mod correlations;

pub use correlations::CorrelationsRepository;
