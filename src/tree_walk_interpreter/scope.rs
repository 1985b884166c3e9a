use std::{cell::RefCell, fmt::Debug, rc::Rc};

use crate::resolver::Address;

use super::Value;

/// One activation frame. Slots are addressed by the indices the resolver hands
/// out, in declaration order.
pub struct Scope {
    slots: Vec<Value>,
    cursor: usize,
    parent: Option<Rc<RefCell<Scope>>>,
}

impl Scope {
    pub fn boxed(parent: Option<Rc<RefCell<Scope>>>) -> Rc<RefCell<Self>> {
        Self::with_slots(parent, vec![])
    }

    pub fn with_slots(parent: Option<Rc<RefCell<Scope>>>, slots: Vec<Value>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            cursor: slots.len(),
            slots,
            parent,
        }))
    }

    /// Writes the next slot and returns its index.
    pub fn define(&mut self, value: Value) -> usize {
        let slot = self.cursor;
        if slot < self.slots.len() {
            self.slots[slot] = value;
        } else {
            self.slots.push(value);
        }
        self.cursor += 1;
        slot
    }

    /// Restarts declarations at slot 0 while keeping the frame itself, so
    /// closures holding it see the new values.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn get(&self, slot: usize) -> Option<Value> {
        self.slots.get(slot).cloned()
    }

    pub fn assign(&mut self, slot: usize, value: Value) -> Option<()> {
        let target = self.slots.get_mut(slot)?;
        *target = value;
        Some(())
    }

    pub fn parent(&self) -> Option<&Rc<RefCell<Scope>>> {
        self.parent.as_ref()
    }

    fn climb_scopes(scope: &Rc<RefCell<Scope>>, distance: usize) -> Option<Rc<RefCell<Scope>>> {
        let mut scope = scope.clone();
        for _ in 0..distance {
            let parent = scope.borrow().parent().cloned()?;
            scope = parent;
        }
        Some(scope)
    }

    pub fn get_at(scope: &Rc<RefCell<Scope>>, address: Address) -> Option<Value> {
        let scope = Self::climb_scopes(scope, address.depth)?;
        let value = scope.borrow().get(address.slot);
        value
    }

    pub fn assign_at(scope: &Rc<RefCell<Scope>>, address: Address, value: Value) -> Option<()> {
        let scope = Self::climb_scopes(scope, address.depth)?;
        let result = scope.borrow_mut().assign(address.slot, value);
        result
    }
}

impl Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(format!("Scope<{:?}>", std::ptr::from_ref(self)).as_str())
            .field(
                "slots",
                &self
                    .slots
                    .iter()
                    .map(|value| value.type_name())
                    .collect::<Vec<_>>(),
            )
            .field("cursor", &self.cursor)
            .field("parent", &self.parent.as_ref().map(|p| p.as_ptr()))
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn number(value: Option<Value>) -> f64 {
        match value {
            Some(Value::Number(n)) => n,
            other => panic!("expected number, got {other:?}"),
        }
    }

    #[test]
    fn test_get_at_climbs_frames() {
        let outer = Scope::boxed(None);
        outer.borrow_mut().define(Value::Number(1.0));
        outer.borrow_mut().define(Value::Number(2.0));
        let inner = Scope::with_slots(Some(outer.clone()), vec![Value::Number(3.0)]);

        assert_eq!(number(Scope::get_at(&inner, Address { depth: 0, slot: 0 })), 3.0);
        assert_eq!(number(Scope::get_at(&inner, Address { depth: 1, slot: 1 })), 2.0);
        assert!(Scope::get_at(&inner, Address { depth: 2, slot: 0 }).is_none());
        assert!(Scope::get_at(&inner, Address { depth: 1, slot: 2 }).is_none());
    }

    #[test]
    fn test_assign_at_is_visible_through_every_holder() {
        let outer = Scope::boxed(None);
        outer.borrow_mut().define(Value::Number(1.0));
        let first = Scope::boxed(Some(outer.clone()));
        let second = Scope::boxed(Some(outer.clone()));

        Scope::assign_at(&first, Address { depth: 1, slot: 0 }, Value::Number(5.0)).unwrap();
        assert_eq!(number(Scope::get_at(&second, Address { depth: 1, slot: 0 })), 5.0);
        assert!(Scope::assign_at(&first, Address { depth: 0, slot: 0 }, Value::Null).is_none());
    }

    #[test]
    fn test_rewind_reuses_slots() {
        let frame = Scope::boxed(None);
        assert_eq!(frame.borrow_mut().define(Value::Number(1.0)), 0);
        assert_eq!(frame.borrow_mut().define(Value::Number(2.0)), 1);
        frame.borrow_mut().rewind();
        assert_eq!(frame.borrow_mut().define(Value::Number(3.0)), 0);
        assert_eq!(number(frame.borrow().get(0)), 3.0);
        assert_eq!(number(frame.borrow().get(1)), 2.0);
    }
}
