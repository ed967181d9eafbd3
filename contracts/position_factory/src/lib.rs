#![no_std]
use soroban_sdk::{
    contract, contractclient, contracterror, contractimpl, contracttype, log, symbol_short, token,
    xdr::ToXdr, Address, BytesN, Env, Vec,
};

// ── Errors ───────────────────────────────────────────────────────────────────

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    NotInitialized     = 1,
    Unauthorized       = 3,
    DuplicatePosition  = 4,
    IdenticalTokens    = 5,
    InvalidAmount      = 6,
    TransferFailed     = 7,
}

// ── Registry types ───────────────────────────────────────────────────────────

/// Set once by the constructor.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FactoryConfig {
    /// May sweep assets sent to the factory itself.
    pub admin: Address,
    /// Handed to every position for extraction fees.
    pub fee_collector: Address,
    /// Stellar Asset Contract of the native currency.
    pub native_asset: Address,
    /// Installed wasm of the position contract.
    pub position_wasm_hash: BytesN<32>,
}

/// The tuple a position is unique for. Its XDR hash is also the deployer
/// salt, so a position's address follows from the tuple alone.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PositionKey {
    pub owner: Address,
    pub collateral_token: Address,
    pub debt_token: Address,
    pub borrow_token: Address,
}

// ── Storage keys ─────────────────────────────────────────────────────────────

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Config,
    Position(BytesN<32>),  // sha256(xdr(tuple)) -> position address
    Lookup(Address),       // owner -> Vec<position address>, creation order
}

const TTL_BUMP: u32 = 518_400; // ~30 days

// A `PositionKey` with four addresses is over the ledger key size limit, so
// the index is keyed by its hash. The same digest is the deployer salt.
fn tuple_key(e: &Env, key: &PositionKey) -> BytesN<32> {
    e.crypto().sha256(&key.clone().to_xdr(e)).to_bytes()
}

// ── Position contract interface ──────────────────────────────────────────────

#[contractclient(name = "PositionClient")]
pub trait PositionInterface {
    fn initialize(
        env: Env,
        factory: Address,
        owner: Address,
        collateral_token: Address,
        debt_token: Address,
        borrow_token: Address,
        native_asset: Address,
        fee_collector: Address,
    );
}

#[cfg(not(test))]
fn deploy_position(e: &Env, wasm_hash: &BytesN<32>, salt: BytesN<32>) -> Address {
    e.deployer()
        .with_current_contract(salt)
        .deploy_v2(wasm_hash.clone(), ())
}

#[cfg(test)]
fn deploy_position(e: &Env, _wasm_hash: &BytesN<32>, salt: BytesN<32>) -> Address {
    // Mock: no compiled position wasm in unit tests, register the native
    // contract at the address the deployer would have used.
    let address = e.deployer().with_current_contract(salt).deployed_address();
    e.register_at(&address, leveraged_position::Position, ())
}

// ── Contract ─────────────────────────────────────────────────────────────────

#[contract]
pub struct PositionFactory;

#[contractimpl]
impl PositionFactory {
    // ── Construction ─────────────────────────────────────────────────────────

    /// Runs once, inside the deployment itself, so nobody can configure the
    /// factory between deploy and setup.
    pub fn __constructor(
        e: Env,
        admin: Address,
        fee_collector: Address,
        native_asset: Address,
        position_wasm_hash: BytesN<32>,
    ) {
        let config = FactoryConfig {
            admin,
            fee_collector,
            native_asset,
            position_wasm_hash,
        };
        e.storage().instance().set(&DataKey::Config, &config);
        e.storage().instance().extend_ttl(TTL_BUMP, TTL_BUMP);
    }

    // ── Position creation (user-callable) ─────────────────────────────────────

    /// Deploys the position for `(owner, collateral, debt, borrow)` with
    /// `owner` as its only extractor. `value` native units are forwarded from
    /// the owner to the new position. A tuple can only be created once.
    pub fn create_position(
        e: Env,
        owner: Address,
        collateral_token: Address,
        debt_token: Address,
        borrow_token: Address,
        value: i128,
    ) -> Result<Address, Error> {
        owner.require_auth();
        let config = Self::read_config(&e)?;

        if collateral_token == debt_token
            || collateral_token == borrow_token
            || debt_token == borrow_token
        {
            return Err(Error::IdenticalTokens);
        }
        if value < 0 {
            return Err(Error::InvalidAmount);
        }

        let key = PositionKey {
            owner: owner.clone(),
            collateral_token: collateral_token.clone(),
            debt_token: debt_token.clone(),
            borrow_token: borrow_token.clone(),
        };
        let digest = tuple_key(&e, &key);
        // First writer wins; later calls for the tuple fail here.
        if e
            .storage()
            .persistent()
            .has(&DataKey::Position(digest.clone()))
        {
            return Err(Error::DuplicatePosition);
        }

        let position = deploy_position(&e, &config.position_wasm_hash, digest.clone());
        PositionClient::new(&e, &position).initialize(
            &e.current_contract_address(),
            &owner,
            &collateral_token,
            &debt_token,
            &borrow_token,
            &config.native_asset,
            &config.fee_collector,
        );

        Self::register_position(&e, &key, digest, &position);

        if value > 0 {
            Self::transfer(&e, &config.native_asset, &owner, &position, value)?;
        }

        e.events().publish(
            (symbol_short!("position"), symbol_short!("created")),
            (owner, collateral_token, debt_token, borrow_token, position.clone()),
        );
        Ok(position)
    }

    // ── Read-only ─────────────────────────────────────────────────────────────

    pub fn positions(
        e: Env,
        owner: Address,
        collateral_token: Address,
        debt_token: Address,
        borrow_token: Address,
    ) -> Option<Address> {
        let key = PositionKey {
            owner,
            collateral_token,
            debt_token,
            borrow_token,
        };
        e.storage()
            .persistent()
            .get(&DataKey::Position(tuple_key(&e, &key)))
    }

    /// Every position created for `owner`, oldest first.
    pub fn positions_lookup(e: Env, owner: Address) -> Vec<Address> {
        e.storage()
            .persistent()
            .get(&DataKey::Lookup(owner))
            .unwrap_or(Vec::new(&e))
    }

    pub fn get_positions(e: Env, owner: Address) -> Vec<Address> {
        Self::positions_lookup(e, owner)
    }

    pub fn config(e: Env) -> Result<FactoryConfig, Error> {
        Self::read_config(&e)
    }

    // ── Stray funds ── Admin only ─────────────────────────────────────────────
    //
    // Anything sent straight to the factory is swept to the admin in full.
    // Returns the amount moved.

    pub fn extract_native(e: Env, caller: Address) -> Result<i128, Error> {
        let config = Self::require_admin(&e, &caller)?;
        Self::sweep(&e, &config.admin, &config.native_asset)
    }

    pub fn extract_token(e: Env, caller: Address, token: Address) -> Result<i128, Error> {
        let config = Self::require_admin(&e, &caller)?;
        Self::sweep(&e, &config.admin, &token)
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn read_config(e: &Env) -> Result<FactoryConfig, Error> {
        e.storage()
            .instance()
            .get(&DataKey::Config)
            .ok_or(Error::NotInitialized)
    }

    fn require_admin(e: &Env, caller: &Address) -> Result<FactoryConfig, Error> {
        caller.require_auth();
        let config = Self::read_config(e)?;
        if *caller != config.admin {
            log!(e, "factory: caller is not the admin");
            return Err(Error::Unauthorized);
        }
        Ok(config)
    }

    /// The only writer of both indexes.
    fn register_position(e: &Env, key: &PositionKey, digest: BytesN<32>, position: &Address) {
        let position_key = DataKey::Position(digest);
        e.storage().persistent().set(&position_key, position);
        e.storage()
            .persistent()
            .extend_ttl(&position_key, TTL_BUMP, TTL_BUMP);

        let lookup_key = DataKey::Lookup(key.owner.clone());
        let mut owned: Vec<Address> = e
            .storage()
            .persistent()
            .get(&lookup_key)
            .unwrap_or(Vec::new(e));
        owned.push_back(position.clone());
        e.storage().persistent().set(&lookup_key, &owned);
        e.storage()
            .persistent()
            .extend_ttl(&lookup_key, TTL_BUMP, TTL_BUMP);
        e.storage().instance().extend_ttl(TTL_BUMP, TTL_BUMP);
    }

    fn sweep(e: &Env, admin: &Address, asset: &Address) -> Result<i128, Error> {
        let here = e.current_contract_address();
        let balance = token::Client::new(e, asset).balance(&here);
        if balance <= 0 {
            return Ok(0);
        }
        Self::transfer(e, asset, &here, admin, balance)?;
        e.events().publish(
            (symbol_short!("factory"), symbol_short!("swept")),
            (asset.clone(), balance),
        );
        Ok(balance)
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
