use fundme::{
    chain::{ChainError, LocalChain},
    config::ChainConfig,
    Address, Amount, FundError,
};

const ETH: Amount = 1_000_000_000_000_000_000;
const SEND_VALUE: Amount = ETH;
/// 50 USD at 2000 USD/ETH.
const MIN_VALUE: Amount = 25_000_000_000_000_000;

fn deploy() -> (LocalChain, Address) {
    let deployer = Address::from_label("deployer");
    let chain = LocalChain::deploy(ChainConfig::default(), deployer).unwrap();
    (chain, deployer)
}

fn accounts(n: usize) -> Vec<Address> {
    (1..=n)
        .map(|i| Address::from_label(&format!("account-{i}")))
        .collect()
}

fn revert_reason(result: Result<fundme::chain::Receipt, ChainError>) -> FundError {
    match result {
        Err(ChainError::Reverted { source, .. }) => source,
        other => panic!("expected revert, got {other:?}"),
    }
}

#[test]
fn owner_is_the_deployer() {
    let (chain, deployer) = deploy();
    assert_eq!(chain.contract().owner(), deployer);
}

#[test]
fn constructor_sets_the_aggregator_address() {
    let (chain, _) = deploy();
    assert_eq!(chain.contract().price_feed(), chain.feed_address());
}

#[test]
fn fails_without_enough_value() {
    let (mut chain, deployer) = deploy();
    assert!(matches!(
        revert_reason(chain.fund(deployer, 0)),
        FundError::InvalidAmount
    ));
    let err = revert_reason(chain.fund(deployer, MIN_VALUE - 1));
    assert!(matches!(err, FundError::InsufficientAmount { .. }));
    assert!(err.to_string().contains("not sufficient amount"));
    assert_eq!(chain.contract().balance(), 0);
}

#[test]
fn updates_the_amount_funded() {
    let (mut chain, deployer) = deploy();
    chain.fund(deployer, SEND_VALUE).unwrap();
    assert_eq!(chain.contract().address_to_amount_funded(&deployer), SEND_VALUE);
}

#[test]
fn adds_funder_to_funders() {
    let (mut chain, deployer) = deploy();
    chain.fund(deployer, SEND_VALUE).unwrap();
    assert_eq!(chain.contract().funder(0).unwrap(), deployer);
}

#[test]
fn minimum_boundary_at_2000() {
    let (mut chain, deployer) = deploy();
    assert!(matches!(
        revert_reason(chain.fund(deployer, MIN_VALUE - 1)),
        FundError::InsufficientAmount { .. }
    ));
    chain.fund(deployer, MIN_VALUE).unwrap();
    chain.fund(deployer, MIN_VALUE + 1).unwrap();
    assert_eq!(
        chain.contract().address_to_amount_funded(&deployer),
        2 * MIN_VALUE + 1
    );
    assert_eq!(chain.contract().funders_len(), 1);
}

#[test]
fn only_owner_can_withdraw() {
    let (mut chain, deployer) = deploy();
    chain.fund(deployer, SEND_VALUE).unwrap();
    let attacker = accounts(1)[0];
    let err = revert_reason(chain.withdraw(attacker));
    assert!(matches!(err, FundError::NotAuthorized { caller } if caller == attacker));
    assert_eq!(chain.balance_of(&chain.contract_address()), SEND_VALUE);
    assert_eq!(chain.contract().funder(0).unwrap(), deployer);
}

#[test]
fn withdraws_from_a_single_funder() {
    let (mut chain, deployer) = deploy();
    chain.fund(deployer, SEND_VALUE).unwrap();

    let starting_contract = chain.balance_of(&chain.contract_address());
    let starting_deployer = chain.balance_of(&deployer);

    let receipt = chain.withdraw(deployer).unwrap();

    let ending_contract = chain.balance_of(&chain.contract_address());
    let ending_deployer = chain.balance_of(&deployer);
    assert_eq!(ending_contract, 0);
    assert_eq!(
        ending_deployer + receipt.gas_cost,
        starting_contract + starting_deployer
    );
}

#[test]
fn round_trip_at_exact_minimum() {
    let (mut chain, deployer) = deploy();
    let alice = accounts(1)[0];
    chain.fund(alice, MIN_VALUE).unwrap();

    let before = chain.balance_of(&deployer);
    let receipt = chain.withdraw(deployer).unwrap();
    assert_eq!(chain.balance_of(&chain.contract_address()), 0);
    assert_eq!(
        chain.balance_of(&deployer),
        before + MIN_VALUE - receipt.gas_cost
    );
}

#[test]
fn withdraws_from_multiple_funders() {
    let (mut chain, deployer) = deploy();
    let funders = accounts(6);
    for funder in &funders {
        chain.fund(*funder, SEND_VALUE).unwrap();
    }
    assert_eq!(chain.contract().funders_len(), 6);

    let starting_contract = chain.balance_of(&chain.contract_address());
    let starting_deployer = chain.balance_of(&deployer);
    assert_eq!(starting_contract, 6 * SEND_VALUE);

    let receipt = chain.withdraw(deployer).unwrap();

    assert_eq!(chain.balance_of(&chain.contract_address()), 0);
    assert_eq!(
        chain.balance_of(&deployer) + receipt.gas_cost,
        starting_contract + starting_deployer
    );
    assert!(matches!(
        chain.contract().funder(0),
        Err(FundError::IndexOutOfRange { index: 0, len: 0 })
    ));
    for funder in &funders {
        assert_eq!(chain.contract().address_to_amount_funded(funder), 0);
    }
}

#[test]
fn ledger_reopens_after_withdraw() {
    let (mut chain, deployer) = deploy();
    let [alice, bob]: [Address; 2] = accounts(2).try_into().unwrap();
    chain.fund(alice, SEND_VALUE).unwrap();
    chain.withdraw(deployer).unwrap();

    chain.fund(bob, SEND_VALUE).unwrap();
    chain.fund(alice, SEND_VALUE).unwrap();
    assert_eq!(chain.contract().funders(), &[bob, alice]);
    assert_eq!(chain.contract().epoch(), 1);
    assert_eq!(chain.balance_of(&chain.contract_address()), 2 * SEND_VALUE);
}

#[test]
fn zero_price_never_admits_contributions() {
    let (mut chain, deployer) = deploy();
    chain.set_price(0);
    assert!(matches!(
        revert_reason(chain.fund(deployer, 1_000 * ETH)),
        FundError::PriceUnavailable(_)
    ));
    chain.set_feed_outage(true);
    chain.set_price(2_000_00000000);
    assert!(matches!(
        revert_reason(chain.fund(deployer, ETH)),
        FundError::PriceUnavailable(_)
    ));
    assert_eq!(chain.contract().balance(), 0);
}
