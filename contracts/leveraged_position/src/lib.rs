#![no_std]
use soroban_sdk::{
    contract, contractclient, contracterror, contractimpl, contracttype, log, symbol_short, token,
    Address, Env, Symbol,
};

// ── Errors ───────────────────────────────────────────────────────────────────

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    NotInitialized     = 1,
    AlreadyInitialized = 2,
    Unauthorized       = 3,
    InvalidAmount      = 4,
    TransferFailed     = 5,
    FeeQuoteFailed     = 6,
    UnknownOperation   = 7,
    ReservedOperation  = 8,
}

// ── Position data ────────────────────────────────────────────────────────────
//
// Written once by `initialize` and never touched again. Balances are not
// stored: they are whatever the asset ledgers report for this contract.

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PositionInfo {
    /// The only address allowed to extract funds.
    pub owner: Address,
    pub collateral_token: Address,
    pub debt_token: Address,
    pub borrow_token: Address,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PositionSettings {
    /// Factory that deployed this position.
    pub factory: Address,
    /// Stellar Asset Contract of the native currency.
    pub native_asset: Address,
    /// Quotes the fee taken on every extraction.
    pub fee_collector: Address,
}

// ── Fee collector ────────────────────────────────────────────────────────────

/// External fee accounting. The returned fee is clamped to `[0, amount]`.
#[contractclient(name = "FeeCollectorClient")]
pub trait FeeCollectorInterface {
    fn quote_fee(env: Env, token: Address, amount: i128) -> i128;
}

// ── Storage keys ─────────────────────────────────────────────────────────────

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Info,
    Settings,
}

const TTL_BUMP: u32 = 518_400; // ~30 days at 5s/ledger

// Names a `fallback` call may not use.
const ENTRY_POINTS: [&str; 9] = [
    "initialize",
    "extract_native",
    "extract_token",
    "receive",
    "fallback",
    "info",
    "settings",
    "native_balance",
    "token_balance",
];

// ── Contract ─────────────────────────────────────────────────────────────────

#[contract]
pub struct Position;

#[contractimpl]
impl Position {
    // ── Initialisation ───────────────────────────────────────────────────────

    /// Binds the position to its owner and asset triple. Called by the
    /// factory in the same transaction that deploys the contract.
    pub fn initialize(
        e: Env,
        factory: Address,
        owner: Address,
        collateral_token: Address,
        debt_token: Address,
        borrow_token: Address,
        native_asset: Address,
        fee_collector: Address,
    ) -> Result<(), Error> {
        if e.storage().instance().has(&DataKey::Info) {
            return Err(Error::AlreadyInitialized);
        }
        factory.require_auth();

        let info = PositionInfo {
            owner,
            collateral_token,
            debt_token,
            borrow_token,
        };
        let settings = PositionSettings {
            factory,
            native_asset,
            fee_collector,
        };
        e.storage().instance().set(&DataKey::Info, &info);
        e.storage().instance().set(&DataKey::Settings, &settings);
        e.storage().instance().extend_ttl(TTL_BUMP, TTL_BUMP);
        Ok(())
    }

    // ── Extraction ── owner only ─────────────────────────────────────────────
    //
    // The whole balance leaves in one call: the quoted fee goes to the fee
    // collector, the remainder to the owner. Returns what the owner received.

    pub fn extract_native(e: Env, caller: Address) -> Result<i128, Error> {
        let info = Self::require_owner(&e, &caller)?;
        let settings = Self::read_settings(&e)?;
        Self::extract(&e, &info, &settings, &settings.native_asset)
    }

    pub fn extract_token(e: Env, caller: Address, token: Address) -> Result<i128, Error> {
        let info = Self::require_owner(&e, &caller)?;
        let settings = Self::read_settings(&e)?;
        Self::extract(&e, &info, &settings, &token)
    }

    // ── Value acceptance ── anyone ───────────────────────────────────────────

    /// Plain native transfer into the position. No access check.
    pub fn receive(e: Env, from: Address, amount: i128) -> Result<(), Error> {
        Self::accept_native(&e, &from, amount)
    }

    /// Catch-all for calls naming an operation this contract does not have.
    /// Carrying value credits the position exactly like `receive`; carrying
    /// none is an error.
    pub fn fallback(e: Env, from: Address, operation: Symbol, amount: i128) -> Result<(), Error> {
        if ENTRY_POINTS
            .iter()
            .any(|name| Symbol::new(&e, name) == operation)
        {
            return Err(Error::ReservedOperation);
        }
        if amount == 0 {
            return Err(Error::UnknownOperation);
        }
        Self::accept_native(&e, &from, amount)
    }

    // ── Read-only ─────────────────────────────────────────────────────────────

    pub fn info(e: Env) -> Result<PositionInfo, Error> {
        e.storage()
            .instance()
            .get(&DataKey::Info)
            .ok_or(Error::NotInitialized)
    }

    pub fn settings(e: Env) -> Result<PositionSettings, Error> {
        Self::read_settings(&e)
    }

    pub fn native_balance(e: Env) -> Result<i128, Error> {
        let settings = Self::read_settings(&e)?;
        Ok(token::Client::new(&e, &settings.native_asset).balance(&e.current_contract_address()))
    }

    pub fn token_balance(e: Env, token: Address) -> i128 {
        token::Client::new(&e, &token).balance(&e.current_contract_address())
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    /// Single authorization check for every privileged entry point.
    fn require_owner(e: &Env, caller: &Address) -> Result<PositionInfo, Error> {
        caller.require_auth();
        let info = Self::info(e.clone())?;
        if *caller != info.owner {
            log!(e, "position: caller is not the owner");
            return Err(Error::Unauthorized);
        }
        Ok(info)
    }

    fn read_settings(e: &Env) -> Result<PositionSettings, Error> {
        e.storage()
            .instance()
            .get(&DataKey::Settings)
            .ok_or(Error::NotInitialized)
    }

    fn extract(
        e: &Env,
        info: &PositionInfo,
        settings: &PositionSettings,
        asset: &Address,
    ) -> Result<i128, Error> {
        let here = e.current_contract_address();
        let balance = token::Client::new(e, asset).balance(&here);
        if balance <= 0 {
            return Ok(0);
        }

        let fee = Self::quote_fee(e, settings, asset, balance)?;
        if fee > 0 {
            Self::transfer(e, asset, &here, &settings.fee_collector, fee)?;
        }
        let payout = balance - fee;
        if payout > 0 {
            Self::transfer(e, asset, &here, &info.owner, payout)?;
        }

        e.storage().instance().extend_ttl(TTL_BUMP, TTL_BUMP);
        e.events().publish(
            (symbol_short!("position"), symbol_short!("extracted")),
            (info.owner.clone(), asset.clone(), payout, fee),
        );
        Ok(payout)
    }

    fn quote_fee(
        e: &Env,
        settings: &PositionSettings,
        asset: &Address,
        amount: i128,
    ) -> Result<i128, Error> {
        match FeeCollectorClient::new(e, &settings.fee_collector).try_quote_fee(asset, &amount) {
            Ok(Ok(fee)) => Ok(fee.clamp(0, amount)),
            _ => Err(Error::FeeQuoteFailed),
        }
    }

    fn accept_native(e: &Env, from: &Address, amount: i128) -> Result<(), Error> {
        from.require_auth();
        if amount < 0 {
            return Err(Error::InvalidAmount);
        }
        if amount == 0 {
            return Ok(());
        }
        let settings = Self::read_settings(e)?;
        Self::transfer(
            e,
            &settings.native_asset,
            from,
            &e.current_contract_address(),
            amount,
        )?;
        e.events().publish(
            (symbol_short!("position"), symbol_short!("received")),
            (from.clone(), amount),
        );
        Ok(())
    }

    fn transfer(
        e: &Env,
        asset: &Address,
        from: &Address,
        to: &Address,
        amount: i128,
    ) -> Result<(), Error> {
        match token::Client::new(e, asset).try_transfer(from, to, &amount) {
            Ok(Ok(())) => Ok(()),
            _ => Err(Error::TransferFailed),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
