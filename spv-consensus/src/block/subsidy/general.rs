//! Block subsidy and halvings (§4.E "subsidy is valid").

use std::convert::TryFrom;

use spv_chain::{
    amount::{Amount, AmountError, NonNegative},
    block::Height,
    parameters::Network,
    transaction::Transaction,
    transparent,
};

/// `BlockSubsidy(height)`: the coin profile's starting subsidy, halved every
/// `subsidy_halving_interval` blocks, reaching zero after the 64th halving
/// (the point at which a right-shift of the original 50-BTC subsidy by 64
/// bits would always yield zero anyway).
pub fn block_subsidy(height: Height, network: Network) -> Result<Amount<NonNegative>, AmountError> {
    let params = network.params();
    let halvings = height.0 / params.subsidy_halving_interval;
    if halvings >= 64 {
        return Amount::try_from(0);
    }
    let subsidy = (params.initial_block_subsidy.satoshis() as u64) >> (halvings as u64);
    Amount::try_from(subsidy)
}

/// Returns every output in `transaction` paying exactly `amount`.
pub fn find_output_with_amount(
    transaction: &Transaction,
    amount: Amount<NonNegative>,
) -> Vec<transparent::Output> {
    transaction
        .outputs
        .iter()
        .filter(|o| o.value == amount)
        .cloned()
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use color_eyre::Report;

    #[test]
    fn block_subsidy_test() -> Result<(), Report> {
        spv_test::init();

        block_subsidy_for_network(Network::Mainnet)?;
        block_subsidy_for_network(Network::Testnet)?;

        Ok(())
    }

    fn block_subsidy_for_network(network: Network) -> Result<(), Report> {
        let halving_interval = network.params().subsidy_halving_interval;

        assert_eq!(
            Amount::try_from(5_000_000_000u64),
            block_subsidy(Height(0), network)
        );
        assert_eq!(
            Amount::try_from(2_500_000_000u64),
            block_subsidy(Height(halving_interval), network)
        );
        assert_eq!(
            Amount::try_from(1_250_000_000u64),
            block_subsidy(Height(halving_interval * 2), network)
        );

        // After the 15th halving, it's 76_293 satoshis.
        assert_eq!(
            Amount::try_from(76_293u64),
            block_subsidy(Height(halving_interval * 15), network)
        );

        // After the 32nd halving, the block subsidy is 1 satoshi.
        assert_eq!(
            Amount::try_from(1u64),
            block_subsidy(Height(halving_interval * 32), network)
        );

        // After the 33rd halving, there is no block subsidy.
        assert_eq!(
            Amount::try_from(0u64),
            block_subsidy(Height(halving_interval * 33), network)
        );
        assert_eq!(
            Amount::try_from(0u64),
            block_subsidy(Height(halving_interval * 64), network)
        );

        Ok(())
    }
}
