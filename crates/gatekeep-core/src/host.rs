//! Execution host
//!
//! A single-threaded, synchronous call stack. Every call opens a frame that
//! snapshots world state (balances and contract storage); an aborted frame
//! restores its snapshot before the error propagates, so an abort at any
//! depth unwinds everything done since the enclosing frame began. Nested
//! calls may re-enter any contract, including one already on the stack.

use crate::revert::Revert;
use crate::types::{Address, Bytes, Selector, U256};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maximum nesting of call frames
pub const MAX_CALL_DEPTH: usize = 1024;

/// A call delivered to a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Immediate caller
    pub sender: Address,
    /// Callee
    pub to: Address,
    /// Full call data (selector followed by argument words)
    pub data: Bytes,
    /// Native value attached to the call
    pub value: U256,
}

impl Message {
    /// Create a message without attached value
    pub fn new(sender: Address, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            sender,
            to,
            data: data.into(),
            value: U256::zero(),
        }
    }

    /// Attach native value
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Function selector, if the call data carries one
    pub fn selector(&self) -> Option<Selector> {
        Selector::of(&self.data)
    }

    /// The `index`-th 32-byte argument word following the selector
    pub fn word(&self, index: usize) -> Option<[u8; 32]> {
        let start = 4 + index.checked_mul(32)?;
        let end = start.checked_add(32)?;
        self.data.get(start..end)?.try_into().ok()
    }

    /// Argument word interpreted as an address
    pub fn address_arg(&self, index: usize) -> Option<Address> {
        self.word(index).map(|w| Address::from_word(&w))
    }

    /// Argument word interpreted as an unsigned integer
    pub fn uint_arg(&self, index: usize) -> Option<U256> {
        self.word(index).map(|w| U256::from_big_endian(&w))
    }
}

/// Code installed at an address
pub trait Contract: Send + Sync {
    /// Handle a call. Returning `Err` aborts the frame.
    fn call(&self, host: &mut Host, msg: &Message) -> Result<Bytes, Revert>;
}

trait Slot: Any + Send + Sync {
    fn clone_slot(&self) -> Box<dyn Slot>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Clone + Send + Sync> Slot for T {
    fn clone_slot(&self) -> Box<dyn Slot> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Clone for Box<dyn Slot> {
    fn clone(&self) -> Self {
        (**self).clone_slot()
    }
}

/// Everything a reverted frame rolls back
#[derive(Clone, Default)]
struct WorldState {
    balances: HashMap<Address, U256>,
    storage: HashMap<(Address, TypeId), Box<dyn Slot>>,
}

/// The execution host: clock, accounts, code and call frames
pub struct Host {
    timestamp: u64,
    code: HashMap<Address, Arc<dyn Contract>>,
    state: WorldState,
    depth: usize,
    max_depth: usize,
    origin: Option<Address>,
    deployed: u64,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("timestamp", &self.timestamp)
            .field("contracts", &self.code.len())
            .field("depth", &self.depth)
            .finish()
    }
}

impl Host {
    /// Create a host whose clock reads `timestamp`
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            code: HashMap::new(),
            state: WorldState::default(),
            depth: 0,
            max_depth: MAX_CALL_DEPTH,
            origin: None,
            deployed: 0,
        }
    }

    /// Lower the frame nesting limit
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.min(MAX_CALL_DEPTH);
        self
    }

    /// Current block timestamp
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Set the clock
    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    /// Move the clock forward
    pub fn advance(&mut self, seconds: u64) {
        self.timestamp = self.timestamp.saturating_add(seconds);
    }

    /// Install code at a fresh address
    pub fn deploy(&mut self, code: impl Contract + 'static) -> Address {
        self.deploy_arc(Arc::new(code))
    }

    /// Install shared code at a fresh address
    pub fn deploy_arc(&mut self, code: Arc<dyn Contract>) -> Address {
        let address = loop {
            self.deployed += 1;
            let candidate = Address::from_label(&format!("gatekeep:deploy:{}", self.deployed));
            if !candidate.is_zero() && !self.code.contains_key(&candidate) {
                break candidate;
            }
        };
        self.deploy_at(address, code);
        address
    }

    /// Install code at a fixed address, replacing whatever was there
    pub fn deploy_at(&mut self, address: Address, code: Arc<dyn Contract>) {
        tracing::debug!(%address, "installing contract code");
        self.code.insert(address, code);
    }

    /// Whether an address holds code
    pub fn has_code(&self, address: &Address) -> bool {
        self.code.contains_key(address)
    }

    /// Sender of the outermost frame, while a call is in progress
    pub fn origin(&self) -> Option<Address> {
        self.origin
    }

    /// Current frame depth (0 outside any call)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Native balance of an account
    pub fn balance(&self, address: &Address) -> U256 {
        self.state.balances.get(address).copied().unwrap_or_default()
    }

    /// Overwrite an account balance
    pub fn set_balance(&mut self, address: Address, amount: U256) {
        self.state.balances.insert(address, amount);
    }

    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), Revert> {
        if from == to {
            return Ok(());
        }
        let remaining = self
            .balance(&from)
            .checked_sub(amount)
            .ok_or_else(|| Revert::new("insufficient balance"))?;
        let credited = self
            .balance(&to)
            .checked_add(amount)
            .ok_or_else(|| Revert::new("balance overflow"))?;
        self.state.balances.insert(from, remaining);
        self.state.balances.insert(to, credited);
        Ok(())
    }

    /// Deliver a call, moving the attached value from sender to callee
    ///
    /// Calls to accounts without code succeed with empty return data.
    pub fn call(&mut self, msg: &Message) -> Result<Bytes, Revert> {
        self.deliver(msg, true)
    }

    /// Deliver a call whose attached value is context only
    ///
    /// The callee sees `msg.value` but no balance moves.
    pub fn consult(&mut self, msg: &Message) -> Result<Bytes, Revert> {
        self.deliver(msg, false)
    }

    fn deliver(&mut self, msg: &Message, move_value: bool) -> Result<Bytes, Revert> {
        self.transact(msg.sender, |host| {
            if move_value && !msg.value.is_zero() {
                host.transfer(msg.sender, msg.to, msg.value)?;
            }
            match host.code.get(&msg.to).cloned() {
                Some(code) => code.call(host, msg),
                None => Ok(Bytes::new()),
            }
        })
    }

    /// Run `f` inside a frame opened by `sender`
    ///
    /// State changes made by `f` are discarded if it returns `Err`.
    pub fn transact<T, E>(
        &mut self,
        sender: Address,
        f: impl FnOnce(&mut Host) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<Revert>,
    {
        if self.depth >= self.max_depth {
            return Err(Revert::new("call depth exceeded").into());
        }

        let checkpoint = self.state.clone();
        if self.depth == 0 {
            self.origin = Some(sender);
        }
        self.depth += 1;

        let result = f(self);

        self.depth -= 1;
        if result.is_err() {
            tracing::trace!(depth = self.depth, "frame aborted, restoring state");
            self.state = checkpoint;
        }
        if self.depth == 0 {
            self.origin = None;
        }
        result
    }

    /// Storage of type `T` owned by `owner`, if ever written
    pub fn storage<T: Any + Clone + Send + Sync>(&self, owner: Address) -> Option<&T> {
        self.state
            .storage
            .get(&(owner, TypeId::of::<T>()))
            .and_then(|slot| (**slot).as_any().downcast_ref::<T>())
    }

    /// Mutable storage of type `T` owned by `owner`, created from `Default`
    pub fn storage_mut<T: Any + Clone + Default + Send + Sync>(&mut self, owner: Address) -> &mut T {
        let slot = self
            .state
            .storage
            .entry((owner, TypeId::of::<T>()))
            .or_insert_with(|| Box::new(T::default()) as Box<dyn Slot>);
        match (**slot).as_any_mut().downcast_mut::<T>() {
            Some(value) => value,
            None => unreachable!("storage slots are keyed by their TypeId"),
        }
    }

    /// Replace the storage of type `T` owned by `owner`
    pub fn set_storage<T: Any + Clone + Send + Sync>(&mut self, owner: Address, value: T) {
        self.state
            .storage
            .insert((owner, TypeId::of::<T>()), Box::new(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Counter(u64);

    /// Bumps its counter, then aborts if the call data says so
    struct Bumper;

    impl Contract for Bumper {
        fn call(&self, host: &mut Host, msg: &Message) -> Result<Bytes, Revert> {
            host.storage_mut::<Counter>(msg.to).0 += 1;
            if msg.data.first() == Some(&1) {
                return Err(Revert::new("bumper aborted"));
            }
            Ok(host.storage_mut::<Counter>(msg.to).0.to_be_bytes().to_vec())
        }
    }

    /// Calls the address in its first argument word, then aborts
    struct CallThenAbort;

    impl Contract for CallThenAbort {
        fn call(&self, host: &mut Host, msg: &Message) -> Result<Bytes, Revert> {
            let inner = msg.address_arg(0).ok_or_else(Revert::silent)?;
            host.call(&Message::new(msg.to, inner, vec![0u8]))?;
            Err(Revert::new("outer aborted"))
        }
    }

    struct Recurse;

    impl Contract for Recurse {
        fn call(&self, host: &mut Host, msg: &Message) -> Result<Bytes, Revert> {
            host.call(&Message::new(msg.to, msg.to, Bytes::new()))
        }
    }

    fn with_arg(addr: Address) -> Vec<u8> {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&addr.to_word());
        data
    }

    #[test]
    fn test_call_without_code_succeeds() {
        let mut host = Host::new(1);
        let eoa = Address::from_label("eoa");
        let out = host
            .call(&Message::new(Address::from_label("alice"), eoa, vec![1u8, 2, 3]))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_revert_rolls_back_storage() {
        let mut host = Host::new(1);
        let bumper = host.deploy(Bumper);
        let alice = Address::from_label("alice");

        host.call(&Message::new(alice, bumper, vec![0u8])).unwrap();
        let err = host.call(&Message::new(alice, bumper, vec![1u8])).unwrap_err();
        assert_eq!(err.reason(), "bumper aborted");
        assert_eq!(host.storage::<Counter>(bumper), Some(&Counter(1)));
    }

    #[test]
    fn test_outer_revert_unwinds_successful_inner_call() {
        let mut host = Host::new(1);
        let bumper = host.deploy(Bumper);
        let outer = host.deploy(CallThenAbort);

        let err = host
            .call(&Message::new(Address::from_label("alice"), outer, with_arg(bumper)))
            .unwrap_err();
        assert_eq!(err.reason(), "outer aborted");
        assert_eq!(host.storage::<Counter>(bumper), None);
    }

    #[test]
    fn test_value_moves_and_rolls_back() {
        let mut host = Host::new(1);
        let alice = Address::from_label("alice");
        let bumper = host.deploy(Bumper);
        host.set_balance(alice, U256::from(100));

        host.call(&Message::new(alice, bumper, vec![0u8]).with_value(U256::from(40)))
            .unwrap();
        assert_eq!(host.balance(&alice), U256::from(60));
        assert_eq!(host.balance(&bumper), U256::from(40));

        host.call(&Message::new(alice, bumper, vec![1u8]).with_value(U256::from(10)))
            .unwrap_err();
        assert_eq!(host.balance(&alice), U256::from(60));

        let err = host
            .call(&Message::new(alice, bumper, vec![0u8]).with_value(U256::from(1000)))
            .unwrap_err();
        assert_eq!(err.reason(), "insufficient balance");
    }

    #[test]
    fn test_consult_does_not_move_value() {
        let mut host = Host::new(1);
        let alice = Address::from_label("alice");
        let bumper = host.deploy(Bumper);

        host.consult(&Message::new(alice, bumper, vec![0u8]).with_value(U256::from(5)))
            .unwrap();
        assert_eq!(host.balance(&bumper), U256::zero());
    }

    #[test]
    fn test_depth_limit() {
        let mut host = Host::new(1).with_max_depth(16);
        let recurse = host.deploy(Recurse);
        let err = host
            .call(&Message::new(Address::from_label("alice"), recurse, Bytes::new()))
            .unwrap_err();
        assert_eq!(err.reason(), "call depth exceeded");
        assert_eq!(host.depth(), 0);
    }

    #[test]
    fn test_transact_restores_on_error() {
        let mut host = Host::new(1);
        let owner = Address::from_label("owner");
        let result: Result<(), Revert> = host.transact(owner, |h| {
            h.storage_mut::<Counter>(owner).0 = 7;
            assert_eq!(h.origin(), Some(owner));
            Err(Revert::new("no"))
        });
        assert!(result.is_err());
        assert_eq!(host.storage::<Counter>(owner), None);
        assert_eq!(host.origin(), None);
    }

    #[test]
    fn test_message_words() {
        let target = Address::from_label("target");
        let mut data = vec![0xaa, 0xbb, 0xcc, 0xdd];
        data.extend_from_slice(&target.to_word());
        let msg = Message::new(Address::ZERO, Address::ZERO, data);
        assert_eq!(msg.address_arg(0), Some(target));
        assert_eq!(msg.word(1), None);
        assert_eq!(
            msg.selector(),
            Some(Selector::from_bytes([0xaa, 0xbb, 0xcc, 0xdd]))
        );
    }
}
