//! Saving and restoring the live set
//!
//! ## Stream layout
//! All values are little endian. A stream is a sequence of records, ending with the stream:
//! ```text
//! record := media:string  block_count:u32  block*
//! block  := key:string    payload:bytes
//! string := length:u32  utf8[length]
//! bytes  := length:u32  u8[length]
//! ```
//! Every block holds the state of one [`Persistable`] feature, written by its
//! [`Persistable::save`]. Loading recreates the featurable from its media first, then lets
//! every block overwrite the state of the feature with the same key.

use super::Handler;
use crate::{
    config::Media,
    factory::Factory,
    feature::Persistable,
    featurable::Featurable,
    identity::Id,
};
use anyhow::{bail, Context};
use log::*;
use lumen_utils::{
    packed::{PackedData, PackedReadExt, PackedWriteExt},
    AnyResult,
};
use std::{
    io::{BufRead, Write},
    mem,
};

struct Record {
    media: Media,
    blocks: Vec<(String, Vec<u8>)>,
}

/// Writes the live featurables of a [`Handler`] into a stream, and brings them back.
///
/// The persister remembers what it loaded last, so loading again replaces those featurables
/// instead of duplicating them.
#[derive(Debug, Default)]
pub struct HandlerPersister {
    loaded: Vec<Id>,
}

impl HandlerPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities of the featurables added by the last [`HandlerPersister::load`].
    pub fn loaded(&self) -> &[Id] {
        &self.loaded
    }

    /// Saves every live featurable in promotion order. Featurables that weren't created from
    /// configuration media can't be recreated, and are skipped.
    ///
    /// Returns the number of saved featurables.
    pub fn save<W: Write>(&self, handler: &Handler, w: &mut W) -> AnyResult<usize> {
        let mut saved = 0;

        for featurable in handler.iter() {
            let Some(media) = featurable.media() else {
                warn!(
                    "Not saving featurable {}, it has no configuration media",
                    featurable.id().map_or("?".to_owned(), |id| id.to_string())
                );
                continue;
            };

            let blocks = Self::save_blocks(featurable)
                .with_context(|| format!("couldn't save `{media}`"))?;

            w.write_packed(media.path().to_owned())?;
            w.write_packed(u32::try_from(blocks.len())?)?;
            for (key, payload) in &blocks {
                w.write_packed(key.to_string())?;
                PackedData::write_packed(payload, w)?;
            }

            saved += 1;
        }

        debug!("Saved {saved} featurable(s)");
        Ok(saved)
    }

    fn save_blocks(featurable: &Featurable) -> AnyResult<Vec<(&'static str, Vec<u8>)>> {
        let mut blocks = vec![];
        for persistable in featurable
            .features()
            .all()
            .filter_map(|feature| feature.persistable())
        {
            let mut payload = vec![];
            persistable.save(&mut payload)?;
            blocks.push((persistable.persist_key(), payload));
        }
        Ok(blocks)
    }

    /// Recreates every featurable of the stream and queues it into `handler`, replacing the
    /// featurables of the previous load.
    ///
    /// The whole stream is read and applied before the handler is touched, so a corrupted stream
    /// or an unknown media leaves the handler as it was.
    ///
    /// Returns the number of loaded featurables.
    pub fn load<R: BufRead>(
        &mut self,
        handler: &mut Handler,
        factory: &Factory,
        r: &mut R,
    ) -> AnyResult<usize> {
        let records = Self::read_records(r)?;

        let mut featurables = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let featurable = Self::restore(factory, record)
                .with_context(|| format!("couldn't restore record {index}"))?;
            handler.validate(&featurable)?;
            featurables.push(featurable);
        }

        // The previous copies must be gone before the new ones get promoted
        handler.discard(mem::take(&mut self.loaded))?;

        for featurable in featurables {
            let id = handler.add(featurable)?;
            self.loaded.push(id);
        }

        debug!("Loaded {} featurable(s)", self.loaded.len());
        Ok(self.loaded.len())
    }

    fn read_records<R: BufRead>(r: &mut R) -> AnyResult<Vec<Record>> {
        let mut records = vec![];

        while !r.fill_buf()?.is_empty() {
            let media = Media::new(r.read_packed::<String>()?);
            let count: u32 = r.read_packed()?;

            let mut blocks = vec![];
            for _ in 0..count {
                let key: String = r.read_packed()?;
                let payload: Vec<u8> = r.read_packed()?;
                blocks.push((key, payload));
            }

            records.push(Record { media, blocks });
        }

        Ok(records)
    }

    fn restore(factory: &Factory, record: Record) -> AnyResult<Featurable> {
        let mut featurable = factory.create(&record.media)?;

        for (key, payload) in record.blocks {
            let Some(persistable) = Self::persistable_mut(&mut featurable, &key) else {
                bail!("`{}` has no feature saved as `{key}`", record.media);
            };

            let mut reader = payload.as_slice();
            persistable.load(&mut reader)?;
            if !reader.is_empty() {
                bail!(
                    "block `{key}` of `{}` has {} unread byte(s)",
                    record.media,
                    reader.len()
                );
            }
        }

        Ok(featurable)
    }

    fn persistable_mut<'a>(
        featurable: &'a mut Featurable,
        key: &str,
    ) -> Option<&'a mut dyn Persistable> {
        featurable
            .features_mut()
            .all_mut()
            .filter_map(|feature| feature.persistable_mut())
            .find(|persistable| persistable.persist_key() == key)
    }
}
