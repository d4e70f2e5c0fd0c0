// Frame storage.
//
// Frames live in a VM-global arena and are addressed by FrameId, so open
// upvalue cells and suspended coroutines can name frames without owning
// them. Slots are reclaimed when a frame exits (its open cells are closed
// first, so no live handle ever points at a freed slot).

use super::lua_frame::LuaFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(u32);

impl FrameId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub struct FrameArena {
    slots: Vec<Option<LuaFrame>>,
    free: Vec<u32>,
}

impl FrameArena {
    pub fn new() -> Self {
        FrameArena {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn insert(&mut self, frame: LuaFrame) -> FrameId {
        match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = Some(frame);
                FrameId(i)
            }
            None => {
                self.slots.push(Some(frame));
                FrameId((self.slots.len() - 1) as u32)
            }
        }
    }

    #[inline]
    pub fn get(&self, id: FrameId) -> &LuaFrame {
        self.slots[id.index()]
            .as_ref()
            .expect("dangling frame handle")
    }

    #[inline]
    pub fn get_mut(&mut self, id: FrameId) -> &mut LuaFrame {
        self.slots[id.index()]
            .as_mut()
            .expect("dangling frame handle")
    }

    pub fn remove(&mut self, id: FrameId) -> LuaFrame {
        let frame = self.slots[id.index()]
            .take()
            .expect("double free of frame slot");
        self.free.push(id.index() as u32);
        frame
    }

    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

impl Default for FrameArena {
    fn default() -> Self {
        Self::new()
    }
}
